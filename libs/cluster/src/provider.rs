//! Lifecycle of the cluster channel service

use std::fmt;
use std::sync::Arc;

use searchlink_core::Properties;
use searchlink_fabric::ConfigLocator;
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::election::{MasterElection, NodeSelector};
use crate::error::{ClusterError, Result};
use crate::listener::{IndexUpdateSink, MasterMessageListener, MessageListener};
use crate::multiplex::{self, ChannelBinding};
use crate::resolver::{ChannelResolver, ChannelSource};
use crate::sender::MessageSender;
use crate::settings::ClusterSettings;

/// Lifecycle of a [`ChannelProvider`]
///
/// `Stopped` is terminal; a provider is started at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Step of the shutdown that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    Disconnect,
    Close,
}

/// Non-fatal problem met while stopping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub step: CleanupStep,
    pub message: String,
}

struct RunningChannel {
    binding: ChannelBinding,
    source: ChannelSource,
    sender: MessageSender,
}

/// Owns the cluster channel for the search backend
///
/// `start` resolves the channel, claims a multiplex id or the whole
/// channel, binds the inbound listener, connects and publishes the local
/// address to the election service. While running, [`service`](Self::service)
/// exposes the [`MessageSender`]. `stop` releases everything this provider
/// acquired and never fails.
///
/// Start and stop take `&mut self`; callers sharing a provider must
/// serialize access themselves.
pub struct ChannelProvider {
    election: Arc<dyn MasterElection>,
    sink: Arc<dyn IndexUpdateSink>,
    resolver: ChannelResolver,
    state: LifecycleState,
    cluster_name: Option<String>,
    running: Option<RunningChannel>,
}

impl ChannelProvider {
    pub fn new(election: Arc<dyn MasterElection>, sink: Arc<dyn IndexUpdateSink>) -> Self {
        Self {
            election,
            sink,
            resolver: ChannelResolver::default(),
            state: LifecycleState::Idle,
            cluster_name: None,
            running: None,
        }
    }

    /// Look stack files up with `locator` instead of the environment default
    pub fn with_locator(mut self, locator: ConfigLocator) -> Self {
        self.resolver = ChannelResolver::new(locator);
        self
    }

    pub fn with_resolver(mut self, resolver: ChannelResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// The sender, only while running
    pub fn service(&self) -> Option<&MessageSender> {
        self.running.as_ref().map(|running| &running.sender)
    }

    pub fn binding(&self) -> Option<&ChannelBinding> {
        self.running.as_ref().map(|running| &running.binding)
    }

    /// Where the running channel came from
    pub fn channel_source(&self) -> Option<&ChannelSource> {
        self.running.as_ref().map(|running| &running.source)
    }

    pub async fn start(&mut self, properties: &Properties) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(ClusterError::IllegalState(self.state));
        }
        self.state = LifecycleState::Starting;

        match self.try_start(properties).await {
            Ok(running) => {
                self.running = Some(running);
                self.state = LifecycleState::Running;
                Ok(())
            }
            Err(e) => {
                error!(error = ?e, "cluster channel failed to start");
                self.state = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    async fn try_start(&mut self, properties: &Properties) -> Result<RunningChannel> {
        let settings = ClusterSettings::from_properties(properties)?;
        self.cluster_name = Some(settings.cluster_name.clone());
        info!(cluster = %settings.cluster_name, "starting cluster channel");

        let resolved = self.resolver.resolve(&settings)?;
        let source = resolved.source.clone();
        let binding = multiplex::claim(resolved, settings.mux_id)?;
        let selector = self.election.acquire();

        match self.bind_and_join(&binding, selector, &settings).await {
            Ok(sender) => Ok(RunningChannel {
                binding,
                source,
                sender,
            }),
            Err(e) => {
                self.election.release();
                multiplex::abandon(&binding).await;
                Err(e)
            }
        }
    }

    async fn bind_and_join(
        &self,
        binding: &ChannelBinding,
        selector: Arc<dyn NodeSelector>,
        settings: &ClusterSettings,
    ) -> Result<MessageSender> {
        let listener: Arc<dyn MessageListener> =
            Arc::new(MasterMessageListener::new(selector.clone(), self.sink.clone()));
        let sender = dispatch::select_sender(binding, listener, settings.delivery_scope.clone())?;
        multiplex::join(binding, &settings.cluster_name).await?;
        dispatch::publish_role(binding.channel(), selector.as_ref(), &settings.cluster_name);
        Ok(sender)
    }

    /// Release the channel; a no-op unless running
    ///
    /// Every clone of the sender stops working. Problems are logged and
    /// returned, the provider always ends stopped.
    pub async fn stop(&mut self) -> Vec<CleanupWarning> {
        if self.state != LifecycleState::Running {
            debug!(state = %self.state, "stop ignored");
            return Vec::new();
        }
        self.state = LifecycleState::Stopping;
        self.election.release();

        let warnings = match self.running.take() {
            Some(running) => release(running).await,
            None => Vec::new(),
        };

        self.state = LifecycleState::Stopped;
        info!(warnings = warnings.len(), "cluster channel stopped");
        warnings
    }
}

async fn release(running: RunningChannel) -> Vec<CleanupWarning> {
    let mut warnings = Vec::new();
    running.sender.retire();

    let channel = running.binding.channel();
    if !channel.is_open() {
        debug!(channel = %channel.id(), "channel already closed");
        return warnings;
    }

    match &running.binding {
        ChannelBinding::Shared { muxer, mux_id, .. } => {
            muxer.remove(*mux_id);
        }
        ChannelBinding::Exclusive { managed: true, .. } => {
            info!(channel = %channel.id(), "disconnecting and closing channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %channel.id(), error = %e, "error while disconnecting channel");
                warnings.push(CleanupWarning {
                    step: CleanupStep::Disconnect,
                    message: e.to_string(),
                });
            }
            if let Err(e) = channel.close().await {
                warn!(channel = %channel.id(), error = %e, "error while closing channel");
                warnings.push(CleanupWarning {
                    step: CleanupStep::Close,
                    message: e.to_string(),
                });
            }
        }
        ChannelBinding::Exclusive { managed: false, .. } => {
            debug!(channel = %channel.id(), "provided channel left open");
        }
    }
    warnings
}

impl fmt::Debug for ChannelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelProvider")
            .field("state", &self.state)
            .field("cluster_name", &self.cluster_name)
            .field("binding", &self.binding())
            .finish()
    }
}
