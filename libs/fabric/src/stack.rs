//! Protocol stack configuration
//!
//! A stack file describes how a [`GroupChannel`](crate::channel::GroupChannel)
//! binds, which members it talks to and whether the flush protocol is on.
//! Files are TOML:
//!
//! ```toml
//! [transport]
//! bind_addr = "0.0.0.0:7800"
//! advertise_addr = "10.0.0.5:7800"
//! connect_timeout_ms = 2000
//!
//! [discovery]
//! members = ["10.0.0.6:7800", "10.0.0.7:7800"]
//!
//! [flush]
//! enabled = true
//! ```

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::DEFAULT_MAX_FRAME_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Address the member listens on. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Address announced to other members, for NAT/container setups
    pub advertise_addr: Option<SocketAddr>,
    pub max_frame_size: usize,
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            advertise_addr: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_ms: 2_000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Static initial membership
    pub members: Vec<SocketAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlushConfig {
    pub enabled: bool,
}

/// Full stack description
///
/// `StackConfig::default()` is the toolkit default stack: loopback bind on
/// an ephemeral port, no static members and no flush protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub transport: TransportConfig,
    pub discovery: DiscoveryConfig,
    pub flush: FlushConfig,
}

impl StackConfig {
    /// Parse a stack from TOML; `origin` only labels errors
    pub fn from_toml_str(source: &str, origin: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::StackConfig {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Read and parse a stack file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.display().to_string())
            } else {
                e.into()
            }
        })?;
        Self::from_toml_str(&source, &path.display().to_string())
    }

    pub fn validate(&self, origin: &str) -> Result<()> {
        if self.transport.max_frame_size == 0 {
            return Err(Error::StackConfig {
                origin: origin.to_string(),
                reason: "transport.max_frame_size must be positive".to_string(),
            });
        }
        if self.transport.max_frame_size > u32::MAX as usize {
            return Err(Error::StackConfig {
                origin: origin.to_string(),
                reason: "transport.max_frame_size does not fit a frame header".to_string(),
            });
        }
        Ok(())
    }
}

/// Finds stack files by name
///
/// Absolute paths are used as given. Relative names are tried against each
/// search root in order.
#[derive(Debug, Clone, Default)]
pub struct ConfigLocator {
    roots: Vec<PathBuf>,
}

impl ConfigLocator {
    /// Environment variable holding extra search roots (platform path list)
    pub const SEARCH_PATH_ENV: &'static str = "SEARCHLINK_CONFIG_PATH";

    /// Locator without search roots; only absolute names resolve
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory first, then every entry of `SEARCHLINK_CONFIG_PATH`
    pub fn from_env() -> Self {
        let mut locator = Self::new().with_root(".");
        if let Some(paths) = env::var_os(Self::SEARCH_PATH_ENV) {
            for root in env::split_paths(&paths) {
                locator = locator.with_root(root);
            }
        }
        locator
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.roots
            .iter()
            .map(|root| root.join(path))
            .find(|candidate| candidate.is_file())
    }

    /// Locate `name` and load it as a stack
    pub fn load(&self, name: &str) -> Result<StackConfig> {
        let path = self
            .locate(name)
            .ok_or_else(|| Error::ConfigNotFound(name.to_string()))?;
        StackConfig::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let config = StackConfig::from_toml_str("[flush]\nenabled = true\n", "inline").unwrap();
        assert!(config.flush.enabled);
        assert_eq!(config.transport, TransportConfig::default());
        assert!(config.discovery.members.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StackConfig::from_toml_str("[transport]\nbind = \"x\"\n", "inline").unwrap_err();
        assert!(matches!(err, Error::StackConfig { .. }));
    }

    #[test]
    fn zero_frame_size_is_invalid() {
        let err = StackConfig::from_toml_str("[transport]\nmax_frame_size = 0\n", "inline")
            .unwrap_err();
        assert!(err.to_string().contains("max_frame_size"));
    }

    #[test]
    fn locator_searches_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("stack.toml"), "").unwrap();

        let locator = ConfigLocator::new()
            .with_root(first.path())
            .with_root(second.path());
        assert_eq!(
            locator.locate("stack.toml"),
            Some(second.path().join("stack.toml"))
        );

        std::fs::write(first.path().join("stack.toml"), "").unwrap();
        assert_eq!(
            locator.locate("stack.toml"),
            Some(first.path().join("stack.toml"))
        );
        assert_eq!(locator.locate("other.toml"), None);
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = ConfigLocator::new().load("missing.xml").unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(name) if name == "missing.xml"));
    }
}
