use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use searchlink_core::NodeAddress;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{BincodeCodec, Codec};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::mux::Muxer;
use crate::request::{self, SendOptions};
use crate::stack::{ConfigLocator, StackConfig};
use crate::transport::{TcpTransport, TcpTransportListener, Transport};

/// Consumer of inbound messages
///
/// Called on tasks owned by the channel. Implementations must not assume
/// any particular task or ordering across members.
#[async_trait::async_trait]
pub trait Receiver: Send + Sync {
    async fn receive(&self, message: Message);
}

/// Whatever sits directly above the channel
#[derive(Clone, Default)]
pub enum UpHandler {
    #[default]
    None,
    /// A single service owns the channel
    Receiver(Arc<dyn Receiver>),
    /// Several services share the channel through a demultiplexer
    Muxer(Arc<Muxer>),
}

impl UpHandler {
    /// The muxer, when the channel is shared
    pub fn muxer(&self) -> Option<&Arc<Muxer>> {
        match self {
            Self::Muxer(muxer) => Some(muxer),
            _ => None,
        }
    }
}

impl fmt::Debug for UpHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Receiver(_) => f.write_str("Receiver"),
            Self::Muxer(muxer) => f.debug_tuple("Muxer").field(&muxer.claimed()).finish(),
        }
    }
}

/// Process-unique identity of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// Lifecycle and traffic counters for a channel
#[derive(Debug, Default)]
pub struct ChannelStats {
    connects: AtomicU64,
    disconnects: AtomicU64,
    closes: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
}

impl ChannelStats {
    /// Successful connects
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Messages handed to the network or looped back
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages handed to the up handler
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

struct Connection {
    cluster: String,
    local: NodeAddress,
    accept_task: JoinHandle<()>,
}

/// Bidirectional endpoint into a process group
///
/// A channel starts open and disconnected. [`connect`](Self::connect) binds
/// the configured address and starts accepting frames from other members;
/// only then does the channel have a local address. Inbound messages go to
/// the current [`UpHandler`].
pub struct GroupChannel {
    id: ChannelId,
    config: StackConfig,
    codec: BincodeCodec,
    open: AtomicBool,
    connection: Mutex<Option<Connection>>,
    members: RwLock<Vec<NodeAddress>>,
    up_handler: Arc<RwLock<UpHandler>>,
    stats: Arc<ChannelStats>,
}

impl GroupChannel {
    /// Build a channel from a stack description
    pub fn new(config: StackConfig) -> Result<Arc<Self>> {
        config.validate("stack")?;
        let members = config
            .discovery
            .members
            .iter()
            .copied()
            .map(NodeAddress::from)
            .collect();
        let channel = Self {
            id: ChannelId::next(),
            codec: BincodeCodec::with_limit(config.transport.max_frame_size as u64),
            config,
            open: AtomicBool::new(true),
            connection: Mutex::new(None),
            members: RwLock::new(members),
            up_handler: Arc::new(RwLock::new(UpHandler::None)),
            stats: Arc::new(ChannelStats::default()),
        };
        debug!(channel = %channel.id, "created group channel");
        Ok(Arc::new(channel))
    }

    /// Build a channel with toolkit defaults
    pub fn with_defaults() -> Result<Arc<Self>> {
        Self::new(StackConfig::default())
    }

    /// Build a channel from a stack file
    pub fn from_file(path: &Path) -> Result<Arc<Self>> {
        Self::new(StackConfig::load(path)?)
    }

    /// Locate a stack file by name and build a channel from it
    pub fn from_resource(locator: &ConfigLocator, name: &str) -> Result<Arc<Self>> {
        Self::new(locator.load(name)?)
    }

    /// Process-unique identity of this channel
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Stack the channel was built from
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Lifecycle and traffic counters
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Whether the channel has not been closed yet
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether the channel is currently joined to a cluster
    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// Local address, available only while connected
    pub fn address(&self) -> Option<NodeAddress> {
        self.connection().as_ref().map(|c| c.local)
    }

    /// Name of the cluster joined, if connected
    pub fn cluster_name(&self) -> Option<String> {
        self.connection().as_ref().map(|c| c.cluster.clone())
    }

    /// Whether the stack runs the flush protocol
    pub fn flush_supported(&self) -> bool {
        self.config.flush.enabled
    }

    /// Current view: known members plus the local address when connected
    pub fn members(&self) -> Vec<NodeAddress> {
        let mut view = read(&self.members).clone();
        if let Some(local) = self.address() {
            if !view.contains(&local) {
                view.push(local);
            }
        }
        view.sort();
        view
    }

    /// Add a member to broadcast to
    pub fn add_member(&self, member: NodeAddress) {
        let mut members = write(&self.members);
        if !members.contains(&member) {
            members.push(member);
        }
    }

    /// Stop broadcasting to a member
    pub fn remove_member(&self, member: NodeAddress) {
        write(&self.members).retain(|m| *m != member);
    }

    /// Snapshot of what currently sits above the channel
    pub fn up_handler(&self) -> UpHandler {
        read(&self.up_handler).clone()
    }

    /// Hand inbound traffic to a single receiver
    pub fn set_receiver(&self, receiver: Arc<dyn Receiver>) {
        *write(&self.up_handler) = UpHandler::Receiver(receiver);
    }

    /// Put a demultiplexer above the channel so several services can share it
    ///
    /// Returns the existing muxer if one is installed. A receiver that was
    /// installed before becomes the muxer's default handler.
    pub fn install_muxer(&self) -> Arc<Muxer> {
        let mut handler = write(&self.up_handler);
        match &*handler {
            UpHandler::Muxer(muxer) => muxer.clone(),
            UpHandler::Receiver(receiver) => {
                let muxer = Arc::new(Muxer::with_default_handler(self.id, receiver.clone()));
                *handler = UpHandler::Muxer(muxer.clone());
                muxer
            }
            UpHandler::None => {
                let muxer = Arc::new(Muxer::new(self.id));
                *handler = UpHandler::Muxer(muxer.clone());
                muxer
            }
        }
    }

    /// Join `cluster`
    ///
    /// Connecting again to the same cluster is a no-op.
    pub async fn connect(&self, cluster: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ChannelClosed);
        }
        if let Some(current) = self.cluster_name() {
            return if current == cluster {
                Ok(())
            } else {
                Err(Error::AlreadyConnected(current))
            };
        }

        let transport = &self.config.transport;
        let listener =
            TcpTransportListener::bind_with_limit(transport.bind_addr, transport.max_frame_size)
                .await?;
        let local = NodeAddress::from(transport.advertise_addr.unwrap_or(listener.local_addr()?));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.codec,
            self.up_handler.clone(),
            self.stats.clone(),
        ));

        let mut connection = self.connection();
        if connection.is_some() {
            accept_task.abort();
            return Err(Error::AlreadyConnected(cluster.to_string()));
        }
        *connection = Some(Connection {
            cluster: cluster.to_string(),
            local,
            accept_task,
        });
        drop(connection);

        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        info!(channel = %self.id, cluster, address = %local, "channel connected");
        Ok(())
    }

    /// Leave the cluster; the channel stays open and may reconnect
    pub async fn disconnect(&self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ChannelClosed);
        }
        let connection = self.connection().take().ok_or(Error::NotConnected)?;
        connection.accept_task.abort();
        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        info!(channel = %self.id, cluster = %connection.cluster, "channel disconnected");
        Ok(())
    }

    /// Release the channel for good. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(connection) = self.connection().take() {
            connection.accept_task.abort();
            self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        }
        *write(&self.up_handler) = UpHandler::None;
        self.stats.closes.fetch_add(1, Ordering::Relaxed);
        info!(channel = %self.id, "channel closed");
        Ok(())
    }

    /// Send a message to its destination, or to every member if it has none
    ///
    /// Messages addressed to the local member, and the local copy of a
    /// broadcast, are handed to the up handler without touching the network.
    pub async fn send(&self, mut message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ChannelClosed);
        }
        let local = self.address().ok_or(Error::NotConnected)?;
        message.src = Some(local);
        let options = SendOptions {
            connect_timeout: self.config.transport.connect_timeout(),
            max_frame_size: self.config.transport.max_frame_size,
        };

        let dest = message.dest;
        match dest {
            Some(dest) if dest == local => self.deliver_locally(message),
            Some(dest) => {
                request::send_message(dest.socket_addr(), &message, &self.codec, options).await?;
            }
            None => {
                let frame = self.codec.encode(&message)?;
                let remotes: Vec<NodeAddress> = read(&self.members)
                    .iter()
                    .copied()
                    .filter(|m| *m != local)
                    .collect();
                let mut delivered = 0;
                for member in &remotes {
                    match request::send_frame(member.socket_addr(), &frame, options).await {
                        Ok(()) => delivered += 1,
                        Err(e) => warn!(channel = %self.id, %member, error = %e, "broadcast delivery failed"),
                    }
                }
                self.deliver_locally(message);
                if delivered < remotes.len() {
                    return Err(Error::PartialBroadcast {
                        delivered,
                        attempted: remotes.len(),
                    });
                }
            }
        }

        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn deliver_locally(&self, message: Message) {
        let handler = self.up_handler.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            stats.received.fetch_add(1, Ordering::Relaxed);
            deliver(&handler, message).await;
        });
    }

    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GroupChannel {
    fn drop(&mut self) {
        let connection = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = connection.take() {
            connection.accept_task.abort();
        }
    }
}

impl fmt::Debug for GroupChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupChannel")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("address", &self.address())
            .field("up_handler", &self.up_handler())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpTransportListener,
    codec: BincodeCodec,
    handler: Arc<RwLock<UpHandler>>,
    stats: Arc<ChannelStats>,
) {
    loop {
        match listener.accept().await {
            Ok((transport, peer)) => {
                tokio::spawn(read_loop(transport, peer, codec, handler.clone(), stats.clone()));
            }
            Err(e) => {
                warn!(error = %e, "failed to accept member connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn read_loop(
    mut transport: TcpTransport,
    peer: std::net::SocketAddr,
    codec: BincodeCodec,
    handler: Arc<RwLock<UpHandler>>,
    stats: Arc<ChannelStats>,
) {
    loop {
        let frame = match transport.receive().await {
            Ok(frame) => frame,
            Err(Error::ConnectionClosed) => break,
            Err(e) => {
                debug!(%peer, error = %e, "dropping member connection");
                break;
            }
        };
        match codec.decode::<Message>(&frame) {
            Ok(message) => {
                stats.received.fetch_add(1, Ordering::Relaxed);
                deliver(&handler, message).await;
            }
            Err(e) => warn!(%peer, error = %e, "discarding undecodable frame"),
        }
    }
}

async fn deliver(handler: &RwLock<UpHandler>, message: Message) {
    let current = read(handler).clone();
    match current {
        UpHandler::None => debug!(src = ?message.src, "no up handler, message dropped"),
        UpHandler::Receiver(receiver) => receiver.receive(message).await,
        UpHandler::Muxer(muxer) => muxer.route(message).await,
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
