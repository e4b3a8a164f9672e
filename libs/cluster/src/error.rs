//! Cluster service errors

use searchlink_fabric::MuxId;
use thiserror::Error;

use crate::provider::LifecycleState;

/// Result type for cluster channel operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Cluster channel errors
///
/// Every variant raised while starting is fatal: the service is never
/// produced and no retry is attempted.
#[derive(Debug, Error)]
pub enum ClusterError {
    // ==================== Configuration Errors ====================
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("channel is multiplexed but no multiplex id is configured")]
    MissingMuxId,

    #[error("multiplex id {0} is already taken on the shared channel")]
    MuxIdConflict(MuxId),

    // ==================== Channel Errors ====================
    #[error("unable to create channel from {origin}")]
    ChannelCreation {
        origin: String,
        source: searchlink_fabric::Error,
    },

    #[error("unable to connect to cluster '{cluster}'")]
    ClusterConnect {
        cluster: String,
        source: searchlink_fabric::Error,
    },

    // ==================== Runtime Errors ====================
    #[error("operation not allowed while {0}")]
    IllegalState(LifecycleState),

    #[error("send failed")]
    Send(#[source] searchlink_fabric::Error),

    #[error("cluster service is not running")]
    NotRunning,

    #[error("listener failed: {0}")]
    Listener(String),
}

impl From<searchlink_core::Error> for ClusterError {
    fn from(e: searchlink_core::Error) -> Self {
        Self::Configuration(e.to_string())
    }
}
