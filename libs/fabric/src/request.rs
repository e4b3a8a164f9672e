use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;

use crate::codec::Codec;
use crate::error::Result;
use crate::transport::{TcpTransport, Transport};

/// Options for a single point-to-point delivery
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

/// Deliver one pre-encoded frame to a member (fire-and-forget)
///
/// Opens a connection, writes the frame and shuts the connection down.
pub async fn send_frame(addr: SocketAddr, frame: &[u8], options: SendOptions) -> Result<()> {
    let mut transport = TcpTransport::builder()
        .address(addr)
        .connect_timeout(options.connect_timeout)
        .send_timeout(options.connect_timeout)
        .max_frame_size(options.max_frame_size)
        .connect()
        .await?;
    transport.send(frame).await?;
    transport.close().await?;
    Ok(())
}

/// Encode a message with `codec` and deliver it to a single member
pub async fn send_message<T, C>(
    addr: SocketAddr,
    message: &T,
    codec: &C,
    options: SendOptions,
) -> Result<()>
where
    T: Serialize,
    C: Codec,
{
    let frame = codec.encode(message)?;
    send_frame(addr, &frame, options).await
}
