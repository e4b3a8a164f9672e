use thiserror::Error;

use crate::message::MuxId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid stack configuration {origin}: {reason}")]
    StackConfig { origin: String, reason: String },

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Channel already connected to cluster '{0}'")]
    AlreadyConnected(String),

    #[error("Multiplex id {0} is already claimed")]
    MuxIdTaken(MuxId),

    #[error("Multiplex id {0} is not claimed")]
    MuxIdNotClaimed(MuxId),

    #[error("Broadcast reached {delivered} of {attempted} members")]
    PartialBroadcast { delivered: usize, attempted: usize },

    #[error("Request handler failed: {0}")]
    Handler(String),

    #[error("Remote handler failed: {0}")]
    Remote(String),

    #[error("Dispatcher stopped")]
    DispatcherStopped,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;
