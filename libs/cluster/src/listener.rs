//! Inbound side: turning cluster messages into index updates

use std::sync::Arc;

use searchlink_core::NodeAddress;
use searchlink_fabric::{Message, Receiver, RequestHandler};
use tracing::{debug, error, trace, warn};

use crate::election::NodeSelector;
use crate::error::Result;

/// What a listener did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The update reached the index
    Applied,
    /// The message was not for this node and was dropped
    Ignored,
}

/// Receives cluster messages carrying index updates
#[async_trait::async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: &Message) -> Result<Delivery>;
}

/// Backend applying serialized index operations to the authoritative index
pub trait IndexUpdateSink: Send + Sync {
    fn apply(&self, origin: Option<NodeAddress>, payload: &[u8]) -> Result<()>;
}

/// Isolation context entered around each delivery
///
/// Lets the embedding application install whatever per-delivery context
/// its deserialization needs (resource lookups, task-local state) without
/// the listener knowing about it. Store it in the properties as an
/// `Arc<dyn DeliveryScope>`.
pub trait DeliveryScope: Send + Sync {
    fn name(&self) -> &str;

    fn enter(&self);

    fn exit(&self);
}

/// Applies updates only when the local node is the master
pub struct MasterMessageListener {
    selector: Arc<dyn NodeSelector>,
    sink: Arc<dyn IndexUpdateSink>,
}

impl MasterMessageListener {
    pub fn new(selector: Arc<dyn NodeSelector>, sink: Arc<dyn IndexUpdateSink>) -> Self {
        Self { selector, sink }
    }
}

#[async_trait::async_trait]
impl MessageListener for MasterMessageListener {
    async fn on_message(&self, message: &Message) -> Result<Delivery> {
        if !self.selector.is_master() {
            warn!(
                src = ?message.src,
                "index update received on a node that is not the master, ignoring"
            );
            return Ok(Delivery::Ignored);
        }
        trace!(src = ?message.src, bytes = message.payload.len(), "applying index update");
        self.sink.apply(message.src, &message.payload)?;
        Ok(Delivery::Applied)
    }
}

/// Runs the wrapped listener inside a [`DeliveryScope`]
pub struct ScopedMessageListener {
    inner: Arc<dyn MessageListener>,
    scope: Arc<dyn DeliveryScope>,
}

impl ScopedMessageListener {
    pub fn new(inner: Arc<dyn MessageListener>, scope: Arc<dyn DeliveryScope>) -> Self {
        Self { inner, scope }
    }
}

struct ScopeGuard<'a>(&'a dyn DeliveryScope);

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

#[async_trait::async_trait]
impl MessageListener for ScopedMessageListener {
    async fn on_message(&self, message: &Message) -> Result<Delivery> {
        self.scope.enter();
        let _guard = ScopeGuard(self.scope.as_ref());
        debug!(scope = self.scope.name(), "delivering inside scope");
        self.inner.on_message(message).await
    }
}

/// Exposes a listener as the channel's receiver (exclusive channels)
pub(crate) struct ListenerReceiver {
    listener: Arc<dyn MessageListener>,
}

impl ListenerReceiver {
    pub(crate) fn new(listener: Arc<dyn MessageListener>) -> Self {
        Self { listener }
    }
}

#[async_trait::async_trait]
impl Receiver for ListenerReceiver {
    async fn receive(&self, message: Message) {
        if let Err(e) = self.listener.on_message(&message).await {
            error!(src = ?message.src, error = %e, "failed to process cluster message");
        }
    }
}

/// Exposes a listener as a request handler (multiplexed channels)
///
/// An applied update is acknowledged with an empty reply. An ignored one is
/// declined, so only the master ever answers a synchronous send.
pub(crate) struct ListenerRequestHandler {
    listener: Arc<dyn MessageListener>,
}

impl ListenerRequestHandler {
    pub(crate) fn new(listener: Arc<dyn MessageListener>) -> Self {
        Self { listener }
    }
}

#[async_trait::async_trait]
impl RequestHandler for ListenerRequestHandler {
    async fn handle(&self, message: &Message) -> searchlink_fabric::Result<Option<Vec<u8>>> {
        match self.listener.on_message(message).await {
            Ok(Delivery::Applied) => Ok(Some(Vec::new())),
            Ok(Delivery::Ignored) => Ok(None),
            Err(e) => Err(searchlink_fabric::Error::Handler(e.to_string())),
        }
    }
}
