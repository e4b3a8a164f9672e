use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::channel::{GroupChannel, Receiver};
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind, MuxId};

/// Server side of the request/reply exchange
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle one inbound message
    ///
    /// `Some` bytes become the reply payload. `None` declines the message:
    /// no reply is sent, so a requester waiting for the first reply keeps
    /// waiting for a member that accepts it.
    async fn handle(&self, message: &Message) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One-way send, nothing is awaited
    None,
    /// Wait for the first reply
    First,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub mode: ResponseMode,
    pub timeout: Duration,
}

impl RequestOptions {
    pub fn synchronous(timeout: Duration) -> Self {
        Self {
            mode: ResponseMode::First,
            timeout,
        }
    }

    pub fn asynchronous() -> Self {
        Self {
            mode: ResponseMode::None,
            timeout: Duration::ZERO,
        }
    }
}

type PendingReply = oneshot::Sender<Result<Vec<u8>>>;

/// Request/reply dispatcher bound to one multiplex id of a shared channel
///
/// Outbound messages are stamped with the id; inbound requests for the id
/// are answered through the [`RequestHandler`]. The dispatcher must be
/// registered on the channel's muxer under the same id to see traffic.
/// Once [`shutdown`](Self::shutdown) is called it refuses to send, since
/// the id it stamps may already belong to another service.
pub struct MuxMessageDispatcher {
    mux_id: MuxId,
    channel: Arc<GroupChannel>,
    handler: Arc<dyn RequestHandler>,
    pending: DashMap<u64, PendingReply>,
    next_request: AtomicU64,
    stopped: AtomicBool,
}

impl MuxMessageDispatcher {
    pub fn new(mux_id: MuxId, channel: Arc<GroupChannel>, handler: Arc<dyn RequestHandler>) -> Arc<Self> {
        Arc::new(Self {
            mux_id,
            channel,
            handler,
            pending: DashMap::new(),
            next_request: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        })
    }

    /// Multiplex id stamped on every outbound message
    pub fn mux_id(&self) -> MuxId {
        self.mux_id
    }

    /// Shared channel the dispatcher sends through
    pub fn channel(&self) -> &Arc<GroupChannel> {
        &self.channel
    }

    /// Number of requests still waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Send through the shared channel
    ///
    /// Returns the reply payload for synchronous sends, `None` otherwise.
    pub async fn send_message(&self, message: Message, options: RequestOptions) -> Result<Option<Vec<u8>>> {
        if self.is_stopped() {
            return Err(Error::DispatcherStopped);
        }
        let mut message = message.with_mux_id(self.mux_id);
        if options.mode == ResponseMode::None {
            message.kind = MessageKind::Oneway;
            self.channel.send(message).await?;
            return Ok(None);
        }

        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        // A shutdown racing the insert must not leave the request behind
        if self.is_stopped() {
            self.pending.remove(&id);
            return Err(Error::DispatcherStopped);
        }
        message.kind = MessageKind::Request { id };

        if let Err(e) = self.channel.send(message).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(options.timeout, rx).await {
            Ok(Ok(reply)) => reply.map(Some),
            Ok(Err(_)) => Err(Error::DispatcherStopped),
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::Timeout(format!(
                    "no reply to request {id} within {:?}",
                    options.timeout
                )))
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Fail every outstanding request and refuse further sends
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        let outstanding = self.pending.len();
        self.pending.clear();
        if outstanding > 0 {
            debug!(mux_id = %self.mux_id, outstanding, "dispatcher stopped with pending requests");
        }
    }

    async fn answer(&self, request: &Message, id: u64) {
        let Some(requester) = request.src else {
            warn!(mux_id = %self.mux_id, "request without source, cannot reply");
            return;
        };
        let (payload, error) = match self.handler.handle(request).await {
            Ok(Some(payload)) => (payload, None),
            Ok(None) => {
                debug!(mux_id = %self.mux_id, id, %requester, "request declined, no reply");
                return;
            }
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        let mut reply = Message::unicast(requester, payload).with_mux_id(self.mux_id);
        reply.kind = MessageKind::Reply { id, error };
        if let Err(e) = self.channel.send(reply).await {
            warn!(mux_id = %self.mux_id, %requester, error = %e, "failed to send reply");
        }
    }
}

#[async_trait::async_trait]
impl Receiver for MuxMessageDispatcher {
    async fn receive(&self, message: Message) {
        match message.kind.clone() {
            MessageKind::Oneway => {
                if let Err(e) = self.handler.handle(&message).await {
                    warn!(mux_id = %self.mux_id, src = ?message.src, error = %e, "handler failed");
                }
            }
            MessageKind::Request { id } => self.answer(&message, id).await,
            MessageKind::Reply { id, error } => match self.pending.remove(&id) {
                Some((_, tx)) => {
                    let outcome = match error {
                        None => Ok(message.payload),
                        Some(reason) => Err(Error::Remote(reason)),
                    };
                    let _ = tx.send(outcome);
                }
                None => debug!(mux_id = %self.mux_id, id, "late or duplicate reply ignored"),
            },
        }
    }
}
