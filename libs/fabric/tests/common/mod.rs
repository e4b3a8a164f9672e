#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use searchlink_fabric::{GroupChannel, Message, Receiver};
use tokio::sync::Notify;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Receiver that records every message it sees
#[derive(Default)]
pub struct Recorder {
    messages: Mutex<Vec<Message>>,
    arrived: Notify,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Wait until at least `count` messages arrived
    pub async fn wait_for(&self, count: usize) -> Vec<Message> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.arrived.notified();
                let seen = self.messages();
                if seen.len() >= count {
                    return seen;
                }
                notified.await;
            }
        })
        .await
        .expect("messages did not arrive in time")
    }
}

#[async_trait::async_trait]
impl Receiver for Recorder {
    async fn receive(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
        self.arrived.notify_waiters();
    }
}

pub async fn connected_channel(cluster: &str) -> Arc<GroupChannel> {
    let channel = GroupChannel::with_defaults().unwrap();
    channel.connect(cluster).await.unwrap();
    channel
}
