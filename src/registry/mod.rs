//! Lease registry
//!
//! Tracks every cold-stake, lease and lease-reward output of the confirmed
//! chain together with its maturity state. Each mutation is written to a
//! [`TransitionJournal`] keyed by block height, and a reorganization unwinds
//! the journal back to the fork height. The registry is therefore a
//! deterministic function of the confirmed chain.

pub mod journal;
pub mod record;

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::data_structures::transaction::RewardSource;
use crate::data_structures::types::{Amount, BlockHeight, KeyHash, OutPoint};
use crate::errors::RegistryError;
use crate::validation::script_pattern::ClassifiedScript;

pub use journal::{JournalEntry, Transition, TransitionJournal};
pub use record::{LeaseRecord, LeaseRole, LeaseState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRegistry {
    maturity: BlockHeight,
    tip: BlockHeight,
    records: BTreeMap<OutPoint, LeaseRecord>,
    /// Active lease outputs per leaser, ordered by confirmation height
    by_leaser: BTreeMap<KeyHash, BTreeSet<(BlockHeight, OutPoint)>>,
    /// Records waiting for maturity, ordered by maturity height
    immature: BTreeSet<(BlockHeight, OutPoint)>,
    journal: TransitionJournal,
}

impl LeaseRegistry {
    pub fn new(maturity: BlockHeight) -> Self {
        Self {
            maturity,
            tip: 0,
            records: BTreeMap::new(),
            by_leaser: BTreeMap::new(),
            immature: BTreeSet::new(),
            journal: TransitionJournal::new(),
        }
    }

    /// Rebuild a registry from persisted records and journal
    pub fn from_parts(
        maturity: BlockHeight,
        tip: BlockHeight,
        records: Vec<LeaseRecord>,
        journal: TransitionJournal,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(maturity);
        registry.tip = tip;
        registry.journal = journal;
        for record in records {
            if registry.records.contains_key(&record.outpoint) {
                return Err(RegistryError::DuplicateOutput(record.outpoint));
            }
            registry.index(&record);
            registry.records.insert(record.outpoint, record);
        }
        Ok(registry)
    }

    fn index(&mut self, record: &LeaseRecord) {
        if let ClassifiedScript::Lease { leaser, .. } = record.classification {
            self.by_leaser
                .entry(leaser)
                .or_default()
                .insert((record.confirmed_height, record.outpoint));
        }
        if record.state == LeaseState::Immature {
            self.immature
                .insert((record.maturity_height, record.outpoint));
        }
    }

    fn unindex(&mut self, record: &LeaseRecord) {
        if let ClassifiedScript::Lease { leaser, .. } = record.classification {
            if let Some(set) = self.by_leaser.get_mut(&leaser) {
                set.remove(&(record.confirmed_height, record.outpoint));
                if set.is_empty() {
                    self.by_leaser.remove(&leaser);
                }
            }
        }
        self.immature
            .remove(&(record.maturity_height, record.outpoint));
    }

    pub fn maturity(&self) -> BlockHeight {
        self.maturity
    }

    /// Height of the last block applied to the registry
    pub fn tip(&self) -> BlockHeight {
        self.tip
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&LeaseRecord> {
        self.records.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.records.contains_key(outpoint)
    }

    pub fn records(&self) -> impl Iterator<Item = &LeaseRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn journal(&self) -> &TransitionJournal {
        &self.journal
    }

    /// Track a newly confirmed output. Outputs without lease semantics are
    /// ignored and `Ok(false)` is returned.
    pub fn on_confirmed(
        &mut self,
        outpoint: OutPoint,
        value: Amount,
        classification: &ClassifiedScript,
        height: BlockHeight,
    ) -> Result<bool, RegistryError> {
        let Some(role) = LeaseRole::from_classified(classification) else {
            return Ok(false);
        };
        self.insert_confirmed(outpoint, value, classification, role, height)?;
        Ok(true)
    }

    /// Track a confirmed output of a block's reward transaction, taking the
    /// role from the payout it carries rather than from its script
    pub fn on_reward_confirmed(
        &mut self,
        outpoint: OutPoint,
        value: Amount,
        classification: &ClassifiedScript,
        source: &RewardSource,
        height: BlockHeight,
    ) -> Result<bool, RegistryError> {
        if LeaseRole::from_classified(classification).is_none() {
            return Ok(false);
        }
        let role = LeaseRole::from_reward_source(source);
        self.insert_confirmed(outpoint, value, classification, role, height)?;
        Ok(true)
    }

    fn insert_confirmed(
        &mut self,
        outpoint: OutPoint,
        value: Amount,
        classification: &ClassifiedScript,
        role: LeaseRole,
        height: BlockHeight,
    ) -> Result<(), RegistryError> {
        if self.records.contains_key(&outpoint) {
            return Err(RegistryError::DuplicateOutput(outpoint));
        }
        self.journal
            .push(height, Transition::Confirmed { outpoint })?;

        let mut record = LeaseRecord::new(
            outpoint,
            value,
            classification.clone(),
            role,
            height,
            self.maturity,
        );
        record.state = LeaseState::Immature;
        self.index(&record);
        self.records.insert(outpoint, record);
        Ok(())
    }

    /// Mature every record whose maturity height is at or below `height`.
    /// Idempotent; returns the outputs that changed state.
    pub fn on_height_advance(&mut self, height: BlockHeight) -> Result<Vec<OutPoint>, RegistryError> {
        let due: Vec<(BlockHeight, OutPoint)> = self
            .immature
            .iter()
            .take_while(|(maturity_height, _)| *maturity_height <= height)
            .copied()
            .collect();

        let mut matured = Vec::with_capacity(due.len());
        for key in due {
            let outpoint = key.1;
            self.journal
                .push(height, Transition::Matured { outpoint })?;
            self.immature.remove(&key);
            if let Some(record) = self.records.get_mut(&outpoint) {
                record.state = LeaseState::Mature;
            }
            matured.push(outpoint);
        }
        self.tip = self.tip.max(height);

        #[cfg(feature = "tracing")]
        if !matured.is_empty() {
            debug!(height, count = matured.len(), "Lease records matured");
        }
        Ok(matured)
    }

    /// Mark a tracked output spent; it leaves reward selection for good.
    /// Returns `Ok(None)` when the output is not tracked.
    pub fn on_spent(
        &mut self,
        outpoint: &OutPoint,
        height: BlockHeight,
    ) -> Result<Option<LeaseRecord>, RegistryError> {
        let Some(record) = self.records.get(outpoint).cloned() else {
            return Ok(None);
        };
        self.journal.push(
            height,
            Transition::Spent {
                record: record.clone(),
            },
        )?;
        self.unindex(&record);
        self.records.remove(outpoint);

        let mut spent = record;
        spent.state = LeaseState::Spent;
        Ok(Some(spent))
    }

    /// Record that the lease at `outpoint` was rewarded in the block at `height`
    pub fn record_reward(
        &mut self,
        outpoint: &OutPoint,
        height: BlockHeight,
    ) -> Result<(), RegistryError> {
        let record = self
            .records
            .get(outpoint)
            .ok_or(RegistryError::UnknownOutput(*outpoint))?;
        if !record.is_lease() {
            return Err(RegistryError::NotALease(*outpoint));
        }
        if !record.is_mature() {
            return Err(RegistryError::NotMature {
                outpoint: *outpoint,
                height,
            });
        }
        let previous_last_reward_height = record.last_reward_height;
        self.journal.push(
            height,
            Transition::RewardGranted {
                outpoint: *outpoint,
                previous_last_reward_height,
            },
        )?;
        if let Some(record) = self.records.get_mut(outpoint) {
            record.last_reward_height = height;
            record.rewards_granted += 1;
        }
        Ok(())
    }

    /// Mature leases naming `leaser`, oldest confirmation first
    pub fn mature_leases_for(&self, leaser: &KeyHash, at_height: BlockHeight) -> Vec<&LeaseRecord> {
        self.by_leaser
            .get(leaser)
            .into_iter()
            .flatten()
            .filter_map(|(_, outpoint)| self.records.get(outpoint))
            .filter(|r| r.is_mature() && r.maturity_height <= at_height)
            .collect()
    }

    /// Value and count of the owner's mature leases across all leasers
    pub fn owner_lease_stats(&self, owner: &KeyHash, at_height: BlockHeight) -> (Amount, u64) {
        self.records
            .values()
            .filter(|r| r.is_lease() && r.is_mature() && r.maturity_height <= at_height)
            .filter(|r| r.owner().as_ref() == Some(owner))
            .fold((Amount::ZERO, 0), |(sum, n), r| (sum + r.value, n + 1))
    }

    /// Value of all active leases naming `leaser`, immature included
    pub fn total_leased_to(&self, leaser: &KeyHash) -> Amount {
        self.by_leaser
            .get(leaser)
            .into_iter()
            .flatten()
            .filter_map(|(_, outpoint)| self.records.get(outpoint))
            .map(|r| r.value)
            .sum()
    }

    /// Value of all active leases on the chain
    pub fn leasing_supply(&self) -> Amount {
        self.records
            .values()
            .filter(|r| r.is_lease())
            .map(|r| r.value)
            .sum()
    }

    /// Undo every transition recorded at or above `fork_height`.
    /// Returns the number of unwound transitions.
    pub fn rollback_to(&mut self, fork_height: BlockHeight) -> Result<usize, RegistryError> {
        let mut unwound = 0usize;
        while let Some(entry) = self.journal.pop_from(fork_height) {
            self.undo(entry)?;
            unwound += 1;
        }
        self.tip = self.tip.min(fork_height.saturating_sub(1));

        #[cfg(feature = "tracing")]
        debug!(fork_height, unwound, "Lease registry rolled back");
        Ok(unwound)
    }

    fn undo(&mut self, entry: JournalEntry) -> Result<(), RegistryError> {
        let height = entry.height;
        let inconsistent = |reason: String| RegistryError::InconsistentJournal { height, reason };
        match entry.transition {
            Transition::Confirmed { outpoint } => {
                let record = self
                    .records
                    .remove(&outpoint)
                    .ok_or_else(|| inconsistent(format!("confirmed output {outpoint} missing")))?;
                self.unindex(&record);
            }
            Transition::Matured { outpoint } => {
                let record = self
                    .records
                    .get_mut(&outpoint)
                    .ok_or_else(|| inconsistent(format!("matured output {outpoint} missing")))?;
                record.state = LeaseState::Immature;
                let key = (record.maturity_height, outpoint);
                self.immature.insert(key);
            }
            Transition::RewardGranted {
                outpoint,
                previous_last_reward_height,
            } => {
                let record = self
                    .records
                    .get_mut(&outpoint)
                    .ok_or_else(|| inconsistent(format!("rewarded output {outpoint} missing")))?;
                record.last_reward_height = previous_last_reward_height;
                record.rewards_granted = record.rewards_granted.saturating_sub(1);
            }
            Transition::Spent { record } => {
                if self.records.contains_key(&record.outpoint) {
                    return Err(inconsistent(format!(
                        "spent output {} is still tracked",
                        record.outpoint
                    )));
                }
                self.index(&record);
                self.records.insert(record.outpoint, record);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::TxId;

    fn op(n: u8) -> OutPoint {
        OutPoint::new(TxId([n; 32]), 0)
    }

    fn lease(owner: u8, leaser: u8) -> ClassifiedScript {
        ClassifiedScript::Lease {
            owner: KeyHash([owner; 20]),
            leaser: KeyHash([leaser; 20]),
        }
    }

    #[test]
    fn test_standard_outputs_are_not_tracked() {
        let mut registry = LeaseRegistry::new(3);
        let tracked = registry
            .on_confirmed(op(1), Amount::from_coins(1), &ClassifiedScript::Standard(KeyHash([1; 20])), 1)
            .unwrap();
        assert!(!tracked);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_maturity_and_selection_order() {
        let mut registry = LeaseRegistry::new(3);
        let leaser = KeyHash([9; 20]);
        registry.on_confirmed(op(4), Amount::from_coins(10), &lease(1, 9), 5).unwrap();
        registry.on_confirmed(op(3), Amount::from_coins(10), &lease(2, 8), 5).unwrap();
        registry.on_confirmed(op(2), Amount::from_coins(10), &lease(1, 9), 6).unwrap();

        assert!(registry.on_height_advance(7).unwrap().is_empty());
        assert_eq!(registry.on_height_advance(8).unwrap(), vec![op(3), op(4)]);
        assert!(registry.on_height_advance(8).unwrap().is_empty());
        registry.on_height_advance(9).unwrap();

        let selected: Vec<OutPoint> = registry
            .mature_leases_for(&leaser, 9)
            .into_iter()
            .map(|r| r.outpoint)
            .collect();
        assert_eq!(selected, vec![op(4), op(2)]);
        assert_eq!(registry.total_leased_to(&leaser), Amount::from_coins(20));
        assert_eq!(
            registry.owner_lease_stats(&KeyHash([1; 20]), 9),
            (Amount::from_coins(20), 2)
        );
    }

    #[test]
    fn test_self_lease_reward_roles_follow_source() {
        let mut registry = LeaseRegistry::new(3);
        let own = KeyHash([5; 20]);
        let reward = ClassifiedScript::LeaseReward { owner: own, leaser: own };
        registry
            .on_reward_confirmed(op(1), Amount(28_538), &reward, &RewardSource::Lease(op(9)), 15)
            .unwrap();
        registry
            .on_reward_confirmed(
                op(2),
                Amount(20_000_000),
                &reward,
                &RewardSource::Leaser(crate::data_structures::transaction::LeaserRole::Ordinary),
                15,
            )
            .unwrap();
        assert_eq!(registry.get(&op(1)).unwrap().role, LeaseRole::Owner);
        assert_eq!(registry.get(&op(2)).unwrap().role, LeaseRole::Leaser);

        let standard = ClassifiedScript::Standard(own);
        assert!(!registry
            .on_reward_confirmed(op(3), Amount(1), &standard, &RewardSource::Lease(op(9)), 15)
            .unwrap());
    }

    #[test]
    fn test_spent_records_leave_selection() {
        let mut registry = LeaseRegistry::new(0);
        let leaser = KeyHash([9; 20]);
        registry.on_confirmed(op(1), Amount::from_coins(10), &lease(1, 9), 1).unwrap();
        registry.on_height_advance(1).unwrap();
        let spent = registry.on_spent(&op(1), 2).unwrap().unwrap();
        assert_eq!(spent.state, LeaseState::Spent);
        assert!(registry.mature_leases_for(&leaser, 2).is_empty());
        assert!(registry.on_spent(&op(1), 2).unwrap().is_none());
    }

    #[test]
    fn test_reward_requires_mature_lease() {
        let mut registry = LeaseRegistry::new(3);
        registry.on_confirmed(op(1), Amount::from_coins(10), &lease(1, 9), 1).unwrap();
        assert!(matches!(
            registry.record_reward(&op(1), 2),
            Err(RegistryError::NotMature { .. })
        ));
        registry.on_height_advance(4).unwrap();
        registry.record_reward(&op(1), 14).unwrap();
        assert_eq!(registry.get(&op(1)).unwrap().last_reward_height, 14);
        assert_eq!(registry.get(&op(1)).unwrap().rewards_granted, 1);
    }

    #[test]
    fn test_rollback_restores_exact_state() {
        let mut registry = LeaseRegistry::new(2);
        registry.on_confirmed(op(1), Amount::from_coins(10), &lease(1, 9), 1).unwrap();
        registry.on_height_advance(1).unwrap();
        registry.on_height_advance(2).unwrap();
        registry.on_height_advance(3).unwrap();
        let snapshot = registry.clone();

        registry.record_reward(&op(1), 4).unwrap();
        registry.on_confirmed(op(2), Amount::from_coins(5), &lease(2, 9), 4).unwrap();
        registry.on_height_advance(4).unwrap();
        registry.on_spent(&op(1), 5).unwrap();
        registry.on_height_advance(5).unwrap();
        registry.on_height_advance(6).unwrap();
        assert_ne!(registry, snapshot);

        let unwound = registry.rollback_to(4).unwrap();
        assert_eq!(unwound, 4);
        assert_eq!(registry, snapshot);
    }
}
