//! Searchlink Fabric - group communication toolkit
//!
//! Provides framed TCP transport, a bincode codec, process-group channels
//! with optional multiplexing of several logical services over one
//! physical channel, and a request/reply dispatcher for multiplexed
//! services.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use searchlink_fabric::{GroupChannel, Message, Receiver};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl Receiver for Printer {
//!     async fn receive(&self, message: Message) {
//!         println!("{} bytes from {:?}", message.payload.len(), message.src);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = GroupChannel::with_defaults()?;
//! channel.set_receiver(Arc::new(Printer));
//! channel.connect("inventory").await?;
//! channel.send(Message::broadcast(b"hello".to_vec())).await?;
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod mux;
pub mod request;
pub mod stack;
pub mod transport;

// Re-exports for convenience
pub use channel::{ChannelId, ChannelStats, GroupChannel, Receiver, UpHandler};
pub use dispatcher::{MuxMessageDispatcher, RequestHandler, RequestOptions, ResponseMode};
pub use error::{Error, Result};
pub use message::{Message, MessageKind, MuxId};
pub use mux::Muxer;
pub use stack::{ConfigLocator, StackConfig};
