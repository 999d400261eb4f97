//! Append-only log of registry transitions, unwound on reorganization

use serde::{Deserialize, Serialize};

use crate::data_structures::types::{BlockHeight, OutPoint};
use crate::errors::RegistryError;
use crate::registry::record::LeaseRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Confirmed {
        outpoint: OutPoint,
    },
    Matured {
        outpoint: OutPoint,
    },
    RewardGranted {
        outpoint: OutPoint,
        previous_last_reward_height: BlockHeight,
    },
    /// Carries the record as it was before the spend
    Spent {
        record: LeaseRecord,
    },
}

impl Transition {
    pub fn outpoint(&self) -> OutPoint {
        match self {
            Transition::Confirmed { outpoint }
            | Transition::Matured { outpoint }
            | Transition::RewardGranted { outpoint, .. } => *outpoint,
            Transition::Spent { record } => record.outpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal's history; never reused after a pop
    pub seq: u64,
    pub height: BlockHeight,
    pub transition: Transition,
}

/// Heights are non-decreasing and sequence numbers strictly increasing from
/// the front of the journal to the back
#[derive(Debug, Clone, Default)]
pub struct TransitionJournal {
    entries: Vec<JournalEntry>,
    next_seq: u64,
}

/// Journals are equal when they record the same transitions at the same
/// heights. Sequence numbers only identify stored rows.
impl PartialEq for TransitionJournal {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| a.height == b.height && a.transition == b.transition)
    }
}

impl Eq for TransitionJournal {}

impl TransitionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a journal from stored entries. `next_seq` is the sequence
    /// number the next pushed entry receives.
    pub fn from_entries(entries: Vec<JournalEntry>, next_seq: u64) -> Result<Self, RegistryError> {
        let mut journal = Self::new();
        for entry in entries {
            if entry.seq < journal.next_seq {
                return Err(RegistryError::InconsistentJournal {
                    height: entry.height,
                    reason: format!("sequence number {} out of order", entry.seq),
                });
            }
            journal.next_seq = entry.seq;
            journal.push(entry.height, entry.transition)?;
        }
        if next_seq < journal.next_seq {
            return Err(RegistryError::InconsistentJournal {
                height: journal.last_height().unwrap_or(0),
                reason: format!("next sequence number {next_seq} already used"),
            });
        }
        journal.next_seq = next_seq;
        Ok(journal)
    }

    pub fn push(&mut self, height: BlockHeight, transition: Transition) -> Result<(), RegistryError> {
        if let Some(last) = self.entries.last() {
            if height < last.height {
                return Err(RegistryError::InconsistentJournal {
                    height,
                    reason: format!("entry below last journal height {}", last.height),
                });
            }
        }
        self.entries.push(JournalEntry {
            seq: self.next_seq,
            height,
            transition,
        });
        self.next_seq += 1;
        Ok(())
    }

    /// Remove and return the newest entry if it was recorded at or above `height`
    pub fn pop_from(&mut self, height: BlockHeight) -> Option<JournalEntry> {
        match self.entries.last() {
            Some(last) if last.height >= height => self.entries.pop(),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_height(&self) -> Option<BlockHeight> {
        self.entries.last().map(|e| e.height)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Entries pushed with a sequence number above `seq`
    pub fn entries_after(&self, seq: Option<u64>) -> &[JournalEntry] {
        let start = match seq {
            Some(seq) => self.entries.partition_point(|e| e.seq <= seq),
            None => 0,
        };
        &self.entries[start..]
    }
}
