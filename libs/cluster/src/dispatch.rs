//! Choosing how outbound messages travel and wiring the inbound listener

use std::sync::Arc;

use searchlink_fabric::{GroupChannel, MuxMessageDispatcher};
use tracing::{info, warn};

use crate::election::NodeSelector;
use crate::error::{ClusterError, Result};
use crate::listener::{
    DeliveryScope, ListenerReceiver, ListenerRequestHandler, MessageListener,
    ScopedMessageListener,
};
use crate::multiplex::ChannelBinding;
use crate::sender::MessageSender;

/// Bind `listener` to the channel and build the matching sender
pub(crate) fn select_sender(
    binding: &ChannelBinding,
    listener: Arc<dyn MessageListener>,
    scope: Option<Arc<dyn DeliveryScope>>,
) -> Result<MessageSender> {
    match binding {
        ChannelBinding::Shared {
            channel,
            muxer,
            mux_id,
        } => {
            let listener = match scope {
                Some(scope) => Arc::new(ScopedMessageListener::new(listener, scope)) as Arc<dyn MessageListener>,
                None => listener,
            };
            let handler = Arc::new(ListenerRequestHandler::new(listener));
            let dispatcher = MuxMessageDispatcher::new(*mux_id, channel.clone(), handler);
            muxer
                .bind(*mux_id, dispatcher.clone())
                .map_err(|e| ClusterError::Configuration(format!("multiplex claim lost: {e}")))?;
            Ok(MessageSender::dispatched(dispatcher))
        }
        ChannelBinding::Exclusive { channel, .. } => {
            channel.set_receiver(Arc::new(ListenerReceiver::new(listener)));
            Ok(MessageSender::direct(channel.clone()))
        }
    }
}

/// Tell the election service where this node lives
///
/// Returns whether the address was published. A channel that is not
/// connected yet has no address, so nothing is published.
pub(crate) fn publish_role(channel: &GroupChannel, selector: &dyn NodeSelector, cluster: &str) -> bool {
    let published = match channel.address() {
        Some(address) => {
            selector.set_local_address(address);
            info!(cluster, %address, "connected to cluster");
            true
        }
        None => {
            warn!(
                cluster,
                channel = %channel.id(),
                "channel is not connected, local address not published"
            );
            false
        }
    };

    if !channel.flush_supported() {
        warn!(cluster, "flush protocol not present in the stack, update ordering may be weaker");
    }
    published
}
