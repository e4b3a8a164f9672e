//! Searchlink Cluster - cluster channel service for index-update propagation
//!
//! Every node submits index updates over a group channel; only the node the
//! election service names as master applies them. This crate owns the
//! channel side of that arrangement:
//!
//! - [`resolver`] decides which channel to use (provided, configured,
//!   default resource, toolkit defaults)
//! - [`multiplex`] claims a multiplex id on shared channels
//! - [`sender`] is the outbound capability, direct or dispatched
//! - [`provider`] drives start and stop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use searchlink_cluster::{
//!     settings, ChannelProvider, IndexUpdateSink, MasterPolicy, StaticElection,
//! };
//! use searchlink_core::{NodeAddress, Properties};
//! use searchlink_fabric::Message;
//!
//! struct Index;
//!
//! impl IndexUpdateSink for Index {
//!     fn apply(&self, _origin: Option<NodeAddress>, _payload: &[u8]) -> searchlink_cluster::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let election = Arc::new(StaticElection::new(MasterPolicy::SelfElected));
//! let mut provider = ChannelProvider::new(election, Arc::new(Index));
//!
//! let mut props = Properties::new();
//! props.set(settings::CLUSTER_NAME, "products");
//! provider.start(&props).await?;
//!
//! if let Some(sender) = provider.service() {
//!     sender
//!         .send(Message::broadcast(b"update".to_vec()), false, std::time::Duration::from_secs(1))
//!         .await?;
//! }
//! provider.stop().await;
//! # Ok(())
//! # }
//! ```

mod dispatch;
pub mod election;
pub mod error;
pub mod listener;
pub mod multiplex;
pub mod provider;
pub mod resolver;
pub mod sender;
pub mod settings;

pub use election::{MasterElection, MasterPolicy, NodeSelector, PolicySelector, StaticElection};
pub use error::{ClusterError, Result};
pub use listener::{Delivery, DeliveryScope, IndexUpdateSink, MasterMessageListener, MessageListener, ScopedMessageListener};
pub use multiplex::ChannelBinding;
pub use provider::{ChannelProvider, CleanupStep, CleanupWarning, LifecycleState};
pub use resolver::{ChannelResolver, ChannelSource, ResolvedChannel, Topology};
pub use sender::MessageSender;
pub use settings::ClusterSettings;
