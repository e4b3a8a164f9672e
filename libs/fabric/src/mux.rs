use std::sync::{Arc, PoisonError, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::channel::{ChannelId, Receiver};
use crate::error::{Error, Result};
use crate::message::{Message, MuxId};

/// Demultiplexer shared by every logical service on one physical channel
///
/// Each service claims a [`MuxId`]. A claim is first reserved, then bound
/// to the handler that will receive traffic for it; messages for a reserved
/// but unbound id are dropped. The muxer only ever removes the id a caller
/// names, so services cannot release each other's claims by accident.
pub struct Muxer {
    channel: ChannelId,
    slots: DashMap<MuxId, Option<Arc<dyn Receiver>>>,
    default_handler: RwLock<Option<Arc<dyn Receiver>>>,
}

impl Muxer {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            slots: DashMap::new(),
            default_handler: RwLock::new(None),
        }
    }

    /// Muxer that routes messages without a claimed id to `handler`
    pub fn with_default_handler(channel: ChannelId, handler: Arc<dyn Receiver>) -> Self {
        let muxer = Self::new(channel);
        muxer.set_default_handler(Some(handler));
        muxer
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn set_default_handler(&self, handler: Option<Arc<dyn Receiver>>) {
        *self
            .default_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Reserve `id` for the caller
    pub fn reserve(&self, id: MuxId) -> Result<()> {
        match self.slots.entry(id) {
            Entry::Occupied(_) => Err(Error::MuxIdTaken(id)),
            Entry::Vacant(slot) => {
                slot.insert(None);
                debug!(channel = %self.channel, mux_id = %id, "multiplex id reserved");
                Ok(())
            }
        }
    }

    /// Attach the handler for a reserved id
    pub fn bind(&self, id: MuxId, handler: Arc<dyn Receiver>) -> Result<()> {
        let mut slot = self.slots.get_mut(&id).ok_or(Error::MuxIdNotClaimed(id))?;
        *slot = Some(handler);
        Ok(())
    }

    /// Reserve and bind in one step
    pub fn add(&self, id: MuxId, handler: Arc<dyn Receiver>) -> Result<()> {
        self.reserve(id)?;
        self.bind(id, handler)
    }

    pub fn is_claimed(&self, id: MuxId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get(&self, id: MuxId) -> Option<Arc<dyn Receiver>> {
        self.slots.get(&id).and_then(|slot| slot.value().clone())
    }

    /// Drop the claim on `id`; returns whether it was held
    pub fn remove(&self, id: MuxId) -> bool {
        let removed = self.slots.remove(&id).is_some();
        if removed {
            debug!(channel = %self.channel, mux_id = %id, "multiplex id released");
        }
        removed
    }

    /// Claimed ids in ascending order
    pub fn claimed(&self) -> Vec<MuxId> {
        let mut ids: Vec<MuxId> = self.slots.iter().map(|slot| *slot.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) async fn route(&self, message: Message) {
        let handler = match message.mux_id {
            Some(id) => self.get(id),
            None => self
                .default_handler
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        match handler {
            Some(handler) => handler.receive(message).await,
            None => debug!(
                channel = %self.channel,
                mux_id = ?message.mux_id,
                "no handler for multiplexed message, dropped"
            ),
        }
    }
}
