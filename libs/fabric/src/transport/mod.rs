use crate::error::Result;

pub mod tcp;

pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};

/// Largest frame accepted unless a stack overrides it
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Transport trait for sending and receiving framed bytes
///
/// Each transport instance represents a single point-to-point connection.
/// Group semantics live one level up, in [`crate::channel::GroupChannel`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive one frame
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}
