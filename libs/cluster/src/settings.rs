//! Configuration keys and their typed form

use std::sync::Arc;

use searchlink_core::Properties;
use searchlink_fabric::{GroupChannel, MuxId};

use crate::error::{ClusterError, Result};
use crate::listener::DeliveryScope;

pub const PREFIX: &str = "searchlink.services.cluster.";
pub const CLUSTER_NAME: &str = "searchlink.services.cluster.cluster-name";
pub const CONFIGURATION_FILE: &str = "searchlink.services.cluster.configuration-file";
pub const PROVIDED_CHANNEL: &str = "searchlink.services.cluster.provided-channel";
pub const DELIVERY_SCOPE: &str = "searchlink.services.cluster.delivery-scope";
pub const MULTIPLEX_ID: &str = "searchlink.services.cluster.multiplex-id";

pub const DEFAULT_CLUSTER_NAME: &str = "Search Cluster";
/// Stack resource looked up when no channel source is configured
pub const DEFAULT_CONFIGURATION_FILE: &str = "flush-tcp.toml";

/// Validated view of the cluster properties
///
/// Every property is checked once here, so the rest of the service works
/// with typed values: a provided channel that is not a [`GroupChannel`] or
/// a multiplex id that is not a 16-bit integer is a configuration error
/// before anything is built.
#[derive(Clone)]
pub struct ClusterSettings {
    pub cluster_name: String,
    pub configuration_file: Option<String>,
    pub provided_channel: Option<Arc<GroupChannel>>,
    pub delivery_scope: Option<Arc<dyn DeliveryScope>>,
    pub mux_id: Option<MuxId>,
}

impl ClusterSettings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let cluster_name = props
            .text(CLUSTER_NAME)?
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CLUSTER_NAME)
            .to_string();

        let provided_channel = props
            .object::<Arc<GroupChannel>>(PROVIDED_CHANNEL)
            .map_err(|e| {
                ClusterError::Configuration(format!("provided channel is not a group channel: {e}"))
            })?;

        let mux_id = props
            .text(MULTIPLEX_ID)?
            .map(|raw| {
                raw.trim().parse::<u16>().map(MuxId).map_err(|e| {
                    ClusterError::Configuration(format!("invalid {MULTIPLEX_ID} '{raw}': {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            cluster_name,
            configuration_file: props.text(CONFIGURATION_FILE)?.map(str::to_string),
            provided_channel,
            delivery_scope: props.object::<Arc<dyn DeliveryScope>>(DELIVERY_SCOPE)?,
            mux_id,
        })
    }
}

impl std::fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("cluster_name", &self.cluster_name)
            .field("configuration_file", &self.configuration_file)
            .field("provided_channel", &self.provided_channel.as_ref().map(|c| c.id()))
            .field("delivery_scope", &self.delivery_scope.as_ref().map(|s| s.name().to_string()))
            .field("mux_id", &self.mux_id)
            .finish()
    }
}
