use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use searchlink_core::NodeAddress;
use searchlink_fabric::{GroupChannel, Message, MuxMessageDispatcher, RequestOptions};
use tracing::debug;

use crate::error::{ClusterError, Result};

#[derive(Clone)]
enum Route {
    /// Writes straight to an exclusively owned channel
    Direct(Arc<GroupChannel>),
    /// Goes through the request/reply dispatcher of a shared channel
    Dispatched(Arc<MuxMessageDispatcher>),
}

/// Outbound capability handed to the search backend while the service runs
///
/// Clones share one running flag. Once the service stops, every clone
/// refuses to send with [`ClusterError::NotRunning`], even when the channel
/// underneath stays open for its owner.
#[derive(Clone)]
pub struct MessageSender {
    route: Route,
    running: Arc<AtomicBool>,
}

impl MessageSender {
    pub(crate) fn direct(channel: Arc<GroupChannel>) -> Self {
        Self::new(Route::Direct(channel))
    }

    pub(crate) fn dispatched(dispatcher: Arc<MuxMessageDispatcher>) -> Self {
        Self::new(Route::Dispatched(dispatcher))
    }

    fn new(route: Route) -> Self {
        Self {
            route,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Channel the messages travel on
    pub fn channel(&self) -> &Arc<GroupChannel> {
        match &self.route {
            Route::Direct(channel) => channel,
            Route::Dispatched(dispatcher) => dispatcher.channel(),
        }
    }

    /// Dispatcher of a shared channel, `None` for direct senders
    pub fn dispatcher(&self) -> Option<&Arc<MuxMessageDispatcher>> {
        match &self.route {
            Route::Dispatched(dispatcher) => Some(dispatcher),
            Route::Direct(_) => None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self.route, Route::Dispatched(_))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Local address on the underlying channel
    pub fn address(&self) -> Option<NodeAddress> {
        self.channel().address()
    }

    /// Current view of the cluster
    pub fn members(&self) -> Vec<NodeAddress> {
        self.channel().members()
    }

    /// Send a serialized index-operation payload
    ///
    /// `synchronous` only matters for dispatched senders, which then wait up
    /// to `timeout` for the master to acknowledge. Direct senders return
    /// once the message is handed to the channel.
    pub async fn send(&self, message: Message, synchronous: bool, timeout: Duration) -> Result<()> {
        if !self.is_running() {
            return Err(ClusterError::NotRunning);
        }
        match &self.route {
            Route::Direct(channel) => channel.send(message).await.map_err(ClusterError::Send),
            Route::Dispatched(dispatcher) => {
                let options = if synchronous {
                    RequestOptions::synchronous(timeout)
                } else {
                    RequestOptions::asynchronous()
                };
                dispatcher
                    .send_message(message, options)
                    .await
                    .map(|_| ())
                    .map_err(ClusterError::Send)
            }
        }
    }

    /// Stop every clone and fail requests still waiting for a reply
    pub(crate) fn retire(&self) {
        self.running.store(false, Ordering::Release);
        if let Route::Dispatched(dispatcher) = &self.route {
            dispatcher.shutdown();
        }
        debug!(channel = %self.channel().id(), "message sender retired");
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("MessageSender");
        match &self.route {
            Route::Direct(channel) => out.field("channel", &channel.id()),
            Route::Dispatched(dispatcher) => out.field("mux_id", &dispatcher.mux_id()),
        };
        out.field("running", &self.is_running()).finish()
    }
}
