//! Master election collaborator
//!
//! The channel service never decides who the master is. It borrows a
//! [`NodeSelector`] from the election service for as long as it runs and
//! tells it the local address once the channel is connected.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use searchlink_core::NodeAddress;
use tracing::{debug, warn};

/// Role context of the local node
pub trait NodeSelector: Send + Sync {
    fn set_local_address(&self, address: NodeAddress);

    fn local_address(&self) -> Option<NodeAddress>;

    /// Whether this node applies index updates
    fn is_master(&self) -> bool;
}

/// Service handing out the node selector
///
/// Every `acquire` must be matched by exactly one `release`.
pub trait MasterElection: Send + Sync {
    fn acquire(&self) -> Arc<dyn NodeSelector>;

    fn release(&self);
}

/// How a [`StaticElection`] decides the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterPolicy {
    /// This node is always the master
    SelfElected,
    /// The member at this address is the master
    Fixed(NodeAddress),
    /// This node never applies updates
    Never,
}

/// Node selector driven by a fixed [`MasterPolicy`]
#[derive(Debug)]
pub struct PolicySelector {
    policy: MasterPolicy,
    local: RwLock<Option<NodeAddress>>,
    address_updates: AtomicUsize,
}

impl PolicySelector {
    pub fn new(policy: MasterPolicy) -> Self {
        Self {
            policy,
            local: RwLock::new(None),
            address_updates: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> MasterPolicy {
        self.policy
    }

    /// How many times the local address was published
    pub fn address_updates(&self) -> usize {
        self.address_updates.load(Ordering::SeqCst)
    }
}

impl NodeSelector for PolicySelector {
    fn set_local_address(&self, address: NodeAddress) {
        *self.local.write().unwrap_or_else(PoisonError::into_inner) = Some(address);
        self.address_updates.fetch_add(1, Ordering::SeqCst);
        debug!(%address, policy = ?self.policy, "local address published");
    }

    fn local_address(&self) -> Option<NodeAddress> {
        *self.local.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_master(&self) -> bool {
        match self.policy {
            MasterPolicy::SelfElected => true,
            MasterPolicy::Never => false,
            MasterPolicy::Fixed(master) => self.local_address() == Some(master),
        }
    }
}

/// Election service with a static policy and handle accounting
#[derive(Debug)]
pub struct StaticElection {
    selector: Arc<PolicySelector>,
    handles: AtomicUsize,
}

impl StaticElection {
    pub fn new(policy: MasterPolicy) -> Self {
        Self {
            selector: Arc::new(PolicySelector::new(policy)),
            handles: AtomicUsize::new(0),
        }
    }

    pub fn selector(&self) -> &Arc<PolicySelector> {
        &self.selector
    }

    /// Handles acquired and not yet released
    pub fn active_handles(&self) -> usize {
        self.handles.load(Ordering::SeqCst)
    }
}

impl MasterElection for StaticElection {
    fn acquire(&self) -> Arc<dyn NodeSelector> {
        self.handles.fetch_add(1, Ordering::SeqCst);
        self.selector.clone()
    }

    fn release(&self) {
        let released = self
            .handles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if released.is_err() {
            warn!("election service released more often than acquired");
        }
    }
}
