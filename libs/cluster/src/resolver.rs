//! Channel resolution: which physical channel this service uses

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use searchlink_fabric::{ConfigLocator, GroupChannel, Muxer, StackConfig, UpHandler};
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};
use crate::settings::{ClusterSettings, DEFAULT_CONFIGURATION_FILE};

/// Where a resolved channel came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSource {
    Provided,
    ConfigurationFile(PathBuf),
    DefaultResource(PathBuf),
    ToolkitDefaults,
}

/// Whether the channel is already shared through a demultiplexer
#[derive(Clone)]
pub enum Topology {
    Exclusive,
    Shared(Arc<Muxer>),
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclusive => f.write_str("Exclusive"),
            Self::Shared(muxer) => f.debug_tuple("Shared").field(&muxer.claimed()).finish(),
        }
    }
}

#[derive(Debug)]
pub struct ResolvedChannel {
    pub channel: Arc<GroupChannel>,
    /// Whether this service owns connect/disconnect/close
    pub managed: bool,
    pub source: ChannelSource,
    pub topology: Topology,
}

/// Picks the channel according to the configured sources
///
/// Precedence: provided channel, configuration file, default resource,
/// toolkit defaults. Only channels built here are managed.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    locator: ConfigLocator,
    default_resource: String,
}

impl Default for ChannelResolver {
    fn default() -> Self {
        Self::new(ConfigLocator::from_env())
    }
}

impl ChannelResolver {
    pub fn new(locator: ConfigLocator) -> Self {
        Self {
            locator,
            default_resource: DEFAULT_CONFIGURATION_FILE.to_string(),
        }
    }

    /// Override the name of the default stack resource
    pub fn with_default_resource(mut self, name: impl Into<String>) -> Self {
        self.default_resource = name.into();
        self
    }

    pub fn locator(&self) -> &ConfigLocator {
        &self.locator
    }

    pub fn resolve(&self, settings: &ClusterSettings) -> Result<ResolvedChannel> {
        let (channel, managed, source) = if let Some(channel) = &settings.provided_channel {
            info!(channel = %channel.id(), "using provided channel");
            if let Some(name) = &settings.configuration_file {
                debug!(file = %name, "configuration file ignored in favour of the provided channel");
            }
            (channel.clone(), false, ChannelSource::Provided)
        } else if let Some(name) = &settings.configuration_file {
            let (channel, path) = self.build_from_resource(name)?;
            (channel, true, ChannelSource::ConfigurationFile(path))
        } else {
            info!(
                resource = %self.default_resource,
                "no channel configured, falling back to the default stack"
            );
            self.build_default()?
        };

        let topology = match channel.up_handler() {
            UpHandler::Muxer(muxer) => Topology::Shared(muxer),
            _ => Topology::Exclusive,
        };

        Ok(ResolvedChannel {
            channel,
            managed,
            source,
            topology,
        })
    }

    fn build_from_resource(&self, name: &str) -> Result<(Arc<GroupChannel>, PathBuf)> {
        let creation_error = |source: searchlink_fabric::Error| ClusterError::ChannelCreation {
            origin: name.to_string(),
            source,
        };
        let path = self
            .locator
            .locate(name)
            .ok_or_else(|| creation_error(searchlink_fabric::Error::ConfigNotFound(name.to_string())))?;
        let channel = GroupChannel::from_file(&path).map_err(creation_error)?;
        Ok((channel, path))
    }

    // TODO: confirm with operations whether a missing default stack should
    // keep falling back to toolkit defaults in production deployments.
    fn build_default(&self) -> Result<(Arc<GroupChannel>, bool, ChannelSource)> {
        if self.locator.locate(&self.default_resource).is_some() {
            let (channel, path) = self.build_from_resource(&self.default_resource)?;
            return Ok((channel, true, ChannelSource::DefaultResource(path)));
        }

        warn!(
            resource = %self.default_resource,
            "default stack configuration not found, using toolkit defaults"
        );
        let channel = GroupChannel::new(StackConfig::default()).map_err(|source| {
            ClusterError::ChannelCreation {
                origin: "toolkit defaults".to_string(),
                source,
            }
        })?;
        Ok((channel, true, ChannelSource::ToolkitDefaults))
    }
}
