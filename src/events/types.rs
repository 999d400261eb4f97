//! Event type definitions for lease lifecycle and chain operations
//!
//! Events are emitted by the chain harness after a block has been applied or
//! rolled back. They are a read-side notification channel and never feed back
//! into consensus state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::data_structures::types::{Amount, BlockHash, BlockHeight, KeyHash, OutPoint};
use crate::registry::LeaseRole;
use crate::rewards::RewardEvent;
use crate::validation::script_pattern::ScriptPattern;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Metadata shared by all events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Process-unique sequence number
    pub event_id: u64,
    pub timestamp: SystemTime,
    /// Component that emitted the event
    pub source: String,
    pub block_height: BlockHeight,
}

impl EventMetadata {
    pub fn new(source: &str, block_height: BlockHeight) -> Self {
        Self {
            event_id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            timestamp: SystemTime::now(),
            source: source.to_string(),
            block_height,
        }
    }
}

/// Trait for events that can provide their type name
pub trait EventType {
    fn event_type(&self) -> &'static str;

    fn metadata(&self) -> &EventMetadata;
}

/// Trait for events that can be serialized for debugging and logging
pub trait SerializableEvent {
    fn to_debug_json(&self) -> Result<String, String>;

    fn to_compact_json(&self) -> Result<String, String>;

    /// Human-readable one line summary
    fn summary(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeasingEvent {
    /// A cold-stake, lease or lease-reward output entered the registry
    LeaseConfirmed {
        metadata: EventMetadata,
        outpoint: OutPoint,
        pattern: ScriptPattern,
        role: LeaseRole,
        value: Amount,
        owner: Option<KeyHash>,
        counterparty: Option<KeyHash>,
    },
    LeaseMatured {
        metadata: EventMetadata,
        outpoint: OutPoint,
    },
    RewardGranted {
        metadata: EventMetadata,
        reward: RewardEvent,
    },
    LeaseSpent {
        metadata: EventMetadata,
        outpoint: OutPoint,
        value: Amount,
    },
    BlockConnected {
        metadata: EventMetadata,
        hash: BlockHash,
        transactions: usize,
        rewards: usize,
    },
    Reorg {
        metadata: EventMetadata,
        fork_height: BlockHeight,
        disconnected_blocks: usize,
    },
}

impl EventType for LeasingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeasingEvent::LeaseConfirmed { .. } => "LeaseConfirmed",
            LeasingEvent::LeaseMatured { .. } => "LeaseMatured",
            LeasingEvent::RewardGranted { .. } => "RewardGranted",
            LeasingEvent::LeaseSpent { .. } => "LeaseSpent",
            LeasingEvent::BlockConnected { .. } => "BlockConnected",
            LeasingEvent::Reorg { .. } => "Reorg",
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            LeasingEvent::LeaseConfirmed { metadata, .. }
            | LeasingEvent::LeaseMatured { metadata, .. }
            | LeasingEvent::RewardGranted { metadata, .. }
            | LeasingEvent::LeaseSpent { metadata, .. }
            | LeasingEvent::BlockConnected { metadata, .. }
            | LeasingEvent::Reorg { metadata, .. } => metadata,
        }
    }
}

impl SerializableEvent for LeasingEvent {
    fn to_debug_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| e.to_string())
    }

    fn to_compact_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| e.to_string())
    }

    fn summary(&self) -> String {
        let height = self.metadata().block_height;
        match self {
            LeasingEvent::LeaseConfirmed {
                outpoint,
                pattern,
                value,
                ..
            } => format!("{pattern} output {outpoint} of {value} confirmed at {height}"),
            LeasingEvent::LeaseMatured { outpoint, .. } => {
                format!("{outpoint} matured at {height}")
            }
            LeasingEvent::RewardGranted { reward, .. } => format!(
                "{} reward of {} to {} at {height}",
                match reward.recipient_role {
                    LeaseRole::Leaser => "leaser",
                    _ => "leasee",
                },
                reward.reward_amount,
                reward.recipient
            ),
            LeasingEvent::LeaseSpent {
                outpoint, value, ..
            } => format!("{outpoint} of {value} spent at {height}"),
            LeasingEvent::BlockConnected {
                hash,
                transactions,
                rewards,
                ..
            } => format!(
                "block {height} {hash} connected with {transactions} transactions and {rewards} rewards"
            ),
            LeasingEvent::Reorg {
                fork_height,
                disconnected_blocks,
                ..
            } => format!("reorg to fork height {fork_height}, {disconnected_blocks} blocks disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::TxId;

    #[test]
    fn test_event_ids_increase() {
        let a = EventMetadata::new("test", 1);
        let b = EventMetadata::new("test", 1);
        assert!(b.event_id > a.event_id);
    }

    #[test]
    fn test_summary_and_json() {
        let event = LeasingEvent::LeaseMatured {
            metadata: EventMetadata::new("registry", 16),
            outpoint: OutPoint::new(TxId([1u8; 32]), 2),
        };
        assert_eq!(event.event_type(), "LeaseMatured");
        assert!(event.summary().ends_with(":2 matured at 16"));
        let json = event.to_compact_json().unwrap();
        assert!(json.contains("LeaseMatured"));
    }
}
