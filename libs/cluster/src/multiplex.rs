//! Claiming a slot on a shared channel, or taking the whole channel

use std::sync::Arc;

use searchlink_fabric::{GroupChannel, Muxer, MuxId};
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};
use crate::resolver::{ResolvedChannel, Topology};

/// How this service holds its channel once resolution is done
#[derive(Clone)]
pub enum ChannelBinding {
    /// The whole channel belongs to this service
    Exclusive {
        channel: Arc<GroupChannel>,
        managed: bool,
    },
    /// This service owns one multiplex id on a shared channel
    Shared {
        channel: Arc<GroupChannel>,
        muxer: Arc<Muxer>,
        mux_id: MuxId,
    },
}

impl ChannelBinding {
    pub fn channel(&self) -> &Arc<GroupChannel> {
        match self {
            Self::Exclusive { channel, .. } | Self::Shared { channel, .. } => channel,
        }
    }

    pub fn mux_id(&self) -> Option<MuxId> {
        match self {
            Self::Shared { mux_id, .. } => Some(*mux_id),
            Self::Exclusive { .. } => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared { .. })
    }

    /// Whether connect/disconnect/close are this service's job
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Exclusive { managed: true, .. })
    }
}

impl std::fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclusive { channel, managed } => f
                .debug_struct("Exclusive")
                .field("channel", &channel.id())
                .field("managed", managed)
                .finish(),
            Self::Shared { channel, mux_id, .. } => f
                .debug_struct("Shared")
                .field("channel", &channel.id())
                .field("mux_id", mux_id)
                .finish(),
        }
    }
}

/// Turn a resolved channel into a binding, claiming a multiplex id if the
/// channel is shared
pub(crate) fn claim(resolved: ResolvedChannel, mux_id: Option<MuxId>) -> Result<ChannelBinding> {
    match resolved.topology {
        Topology::Shared(muxer) => {
            let mux_id = mux_id.ok_or(ClusterError::MissingMuxId)?;
            muxer.reserve(mux_id).map_err(|_| ClusterError::MuxIdConflict(mux_id))?;
            info!(channel = %resolved.channel.id(), %mux_id, "claimed multiplex id on shared channel");
            Ok(ChannelBinding::Shared {
                channel: resolved.channel,
                muxer,
                mux_id,
            })
        }
        Topology::Exclusive => Ok(ChannelBinding::Exclusive {
            channel: resolved.channel,
            managed: resolved.managed,
        }),
    }
}

/// Connect a managed exclusive channel; other bindings are left alone
pub(crate) async fn join(binding: &ChannelBinding, cluster: &str) -> Result<()> {
    if let ChannelBinding::Exclusive {
        channel,
        managed: true,
    } = binding
    {
        channel
            .connect(cluster)
            .await
            .map_err(|source| ClusterError::ClusterConnect {
                cluster: cluster.to_string(),
                source,
            })?;
    }
    Ok(())
}

/// Undo a binding after a failed start
///
/// Releases the claim or closes a managed channel; problems are only logged
/// because the start error is what the caller needs to see.
pub(crate) async fn abandon(binding: &ChannelBinding) {
    match binding {
        ChannelBinding::Shared { muxer, mux_id, .. } => {
            muxer.remove(*mux_id);
        }
        ChannelBinding::Exclusive {
            channel,
            managed: true,
        } => {
            if let Err(e) = channel.close().await {
                warn!(channel = %channel.id(), error = %e, "failed to close channel after aborted start");
            }
        }
        ChannelBinding::Exclusive { managed: false, .. } => {
            debug!("provided channel left untouched after aborted start");
        }
    }
}
