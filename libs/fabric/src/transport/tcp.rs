use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::{Transport, DEFAULT_MAX_FRAME_SIZE};

/// TCP transport with length-prefix framing
///
/// Frames carry a 4-byte big-endian length prefix. Frames above
/// `max_frame_size` are refused on both ends.
pub struct TcpTransport {
    stream: TcpStream,
    max_frame_size: usize,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Connect to a remote member with default settings
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::new()
    }

    /// Wrap an accepted stream
    pub fn from_stream(stream: TcpStream, max_frame_size: usize) -> Self {
        Self {
            stream,
            max_frame_size,
            send_timeout: None,
            receive_timeout: None,
        }
    }

    /// Get the remote address of this connection
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    /// Get the local address of this connection
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.max_frame_size {
            return Err(Error::InvalidFrame(format!(
                "Frame too large: {} bytes (max {})",
                bytes.len(),
                self.max_frame_size
            )));
        }
        self.stream.write_u32(bytes.len() as u32).await?;
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        let len = self.stream.read_u32().await.map_err(closed_on_eof)? as usize;
        if len > self.max_frame_size {
            return Err(Error::InvalidFrame(format!(
                "Frame too large: {} bytes (max {})",
                len, self.max_frame_size
            )));
        }

        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .await
            .map_err(closed_on_eof)?;
        Ok(buf)
    }
}

fn closed_on_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match self.send_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.write_frame(bytes))
                .await
                .map_err(|_| Error::Timeout("send timeout exceeded".to_string()))?,
            None => self.write_frame(bytes).await,
        }
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        match self.receive_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_frame())
                .await
                .map_err(|_| Error::Timeout("receive timeout exceeded".to_string()))?,
            None => self.read_frame().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Accepts inbound member connections
pub struct TcpTransportListener {
    listener: TcpListener,
    max_frame_size: usize,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_limit(addr, DEFAULT_MAX_FRAME_SIZE).await
    }

    /// Bind to a local address, refusing inbound frames above `max_frame_size`
    pub async fn bind_with_limit(addr: SocketAddr, max_frame_size: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            max_frame_size,
        })
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((TcpTransport::from_stream(stream, self.max_frame_size), addr))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

/// Builder for outbound TCP transports
#[derive(Debug)]
pub struct TcpTransportBuilder {
    address: Option<SocketAddr>,
    max_frame_size: usize,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl Default for TcpTransportBuilder {
    fn default() -> Self {
        Self {
            address: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: None,
            send_timeout: None,
            receive_timeout: None,
        }
    }
}

impl TcpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to connect to
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr);
        self
    }

    /// Set the largest frame accepted in either direction
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the receive timeout
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<TcpTransport> {
        let addr = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;

        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| Error::Timeout(format!("connect to {addr} timed out")))??,
            None => TcpStream::connect(addr).await?,
        };

        Ok(TcpTransport {
            stream,
            max_frame_size: self.max_frame_size,
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
        })
    }
}
