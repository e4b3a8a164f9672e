#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use searchlink_cluster::{ChannelProvider, DeliveryScope, IndexUpdateSink, MasterPolicy, StaticElection};
use searchlink_core::NodeAddress;
use searchlink_fabric::ConfigLocator;
use tokio::sync::Notify;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Index backend that records applied payloads
#[derive(Default)]
pub struct RecordingSink {
    applied: Mutex<Vec<(Option<NodeAddress>, Vec<u8>)>>,
    arrived: Notify,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn applied(&self) -> Vec<(Option<NodeAddress>, Vec<u8>)> {
        self.applied.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) -> Vec<(Option<NodeAddress>, Vec<u8>)> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.arrived.notified();
                let seen = self.applied();
                if seen.len() >= count {
                    return seen;
                }
                notified.await;
            }
        })
        .await
        .expect("updates were not applied in time")
    }
}

impl IndexUpdateSink for RecordingSink {
    fn apply(&self, origin: Option<NodeAddress>, payload: &[u8]) -> searchlink_cluster::Result<()> {
        self.applied.lock().unwrap().push((origin, payload.to_vec()));
        self.arrived.notify_waiters();
        Ok(())
    }
}

/// Delivery scope counting how often it was entered and left
#[derive(Default)]
pub struct CountingScope {
    pub entered: AtomicUsize,
    pub exited: AtomicUsize,
}

impl DeliveryScope for CountingScope {
    fn name(&self) -> &str {
        "counting"
    }

    fn enter(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Node {
    pub election: Arc<StaticElection>,
    pub sink: Arc<RecordingSink>,
    pub provider: ChannelProvider,
}

/// Provider whose stack files are looked up in `root` only
pub fn node(policy: MasterPolicy, root: &Path) -> Node {
    let election = Arc::new(StaticElection::new(policy));
    let sink = RecordingSink::new();
    let provider = ChannelProvider::new(election.clone(), sink.clone())
        .with_locator(ConfigLocator::new().with_root(root));
    Node {
        election,
        sink,
        provider,
    }
}
