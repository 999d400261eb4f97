//! Height-indexed service-node membership
//!
//! The leaser rate depends on whether the leaser is a registered service
//! node, so membership is chain data: each change carries the first block
//! height it applies to, lookups answer for a given block, and
//! disconnecting blocks drops the changes made on top of them.

use serde::{Deserialize, Serialize};

use crate::data_structures::transaction::LeaserRole;
use crate::data_structures::types::{BlockHeight, KeyHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNodeChange {
    /// First block height the change applies to
    pub activation_height: BlockHeight,
    pub key_hash: KeyHash,
    pub registered: bool,
}

/// Activation heights are non-decreasing from the front of the log to the back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceNodeSet {
    changes: Vec<ServiceNodeChange>,
}

impl ServiceNodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members from the first block on
    pub fn with_genesis_members<I: IntoIterator<Item = KeyHash>>(members: I) -> Self {
        let mut set = Self::new();
        for key_hash in members {
            set.record(key_hash, true, 1);
        }
        set
    }

    /// Record a change taking effect at `activation_height`. A change below
    /// the newest activation height is raised to it so the log stays ordered.
    pub fn record(&mut self, key_hash: KeyHash, registered: bool, activation_height: BlockHeight) {
        let floor = self.changes.last().map_or(1, |c| c.activation_height);
        self.changes.push(ServiceNodeChange {
            activation_height: activation_height.max(floor),
            key_hash,
            registered,
        });
    }

    /// Membership of `key_hash` for the block at `height`
    pub fn is_member_at(&self, key_hash: &KeyHash, height: BlockHeight) -> bool {
        self.changes
            .iter()
            .take_while(|c| c.activation_height <= height)
            .filter(|c| c.key_hash == *key_hash)
            .last()
            .is_some_and(|c| c.registered)
    }

    pub fn role_at(&self, key_hash: &KeyHash, height: BlockHeight) -> LeaserRole {
        if self.is_member_at(key_hash, height) {
            LeaserRole::ServiceNode
        } else {
            LeaserRole::Ordinary
        }
    }

    /// Drop the changes recorded on top of blocks at or above `fork_height`.
    /// A change made on top of block `h` activates at `h + 1`.
    pub fn rollback_to(&mut self, fork_height: BlockHeight) -> usize {
        let keep = self
            .changes
            .iter()
            .position(|c| c.activation_height > fork_height)
            .unwrap_or(self.changes.len());
        self.changes.split_off(keep).len()
    }

    pub fn changes(&self) -> &[ServiceNodeChange] {
        &self.changes
    }
}
