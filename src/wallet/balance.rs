//! Balance Aggregator
//!
//! Projects the lease registry onto one wallet's keys. Every cold-stake or
//! lease record is seen from two sides: the owner reports it as delegated or
//! leased, the counterparty as cold staking or leasing. Because both views
//! read the same records, the owner's and the counterparty's totals for a
//! relationship always agree.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data_structures::types::{Amount, KeyHash};
use crate::registry::LeaseRegistry;
use crate::validation::script_pattern::ClassifiedScript;

/// Answers whether a key hash belongs to the wallet being aggregated
pub trait KeyOwnership {
    fn owns(&self, key_hash: &KeyHash) -> bool;
}

impl KeyOwnership for [KeyHash] {
    fn owns(&self, key_hash: &KeyHash) -> bool {
        self.contains(key_hash)
    }
}

impl KeyOwnership for BTreeSet<KeyHash> {
    fn owns(&self, key_hash: &KeyHash) -> bool {
        self.contains(key_hash)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalanceSnapshot {
    pub delegated_balance: Amount,
    pub immature_delegated_balance: Amount,
    pub cold_staking_balance: Amount,
    pub immature_cold_staking_balance: Amount,
    pub leased_balance: Amount,
    pub immature_leased_balance: Amount,
    pub leasing_balance: Amount,
    pub immature_leasing_balance: Amount,
}

impl WalletBalanceSnapshot {
    /// Mature and immature delegated plus cold staking value
    pub fn total_cold_staking(&self) -> Amount {
        self.delegated_balance
            + self.immature_delegated_balance
            + self.cold_staking_balance
            + self.immature_cold_staking_balance
    }

    /// Mature and immature leased plus leasing value
    pub fn total_leasing(&self) -> Amount {
        self.leased_balance
            + self.immature_leased_balance
            + self.leasing_balance
            + self.immature_leasing_balance
    }
}

fn credit(mature: bool, mature_bucket: &mut Amount, immature_bucket: &mut Amount, value: Amount) {
    if mature {
        *mature_bucket += value;
    } else {
        *immature_bucket += value;
    }
}

/// Sum the registry's active cold-stake and lease records by the wallet's role in each
pub fn aggregate_balances<K: KeyOwnership + ?Sized>(
    registry: &LeaseRegistry,
    keys: &K,
) -> WalletBalanceSnapshot {
    let mut snapshot = WalletBalanceSnapshot::default();
    for record in registry.records() {
        let mature = record.is_mature();
        match record.classification {
            ClassifiedScript::ColdStake { owner, staker } => {
                if keys.owns(&owner) {
                    credit(
                        mature,
                        &mut snapshot.delegated_balance,
                        &mut snapshot.immature_delegated_balance,
                        record.value,
                    );
                }
                if keys.owns(&staker) {
                    credit(
                        mature,
                        &mut snapshot.cold_staking_balance,
                        &mut snapshot.immature_cold_staking_balance,
                        record.value,
                    );
                }
            }
            ClassifiedScript::Lease { owner, leaser } => {
                if keys.owns(&owner) {
                    credit(
                        mature,
                        &mut snapshot.leased_balance,
                        &mut snapshot.immature_leased_balance,
                        record.value,
                    );
                }
                if keys.owns(&leaser) {
                    credit(
                        mature,
                        &mut snapshot.leasing_balance,
                        &mut snapshot.immature_leasing_balance,
                        record.value,
                    );
                }
            }
            ClassifiedScript::Standard(_)
            | ClassifiedScript::LeaseReward { .. }
            | ClassifiedScript::Nonstandard(_) => {}
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::{OutPoint, TxId};

    fn op(n: u8) -> OutPoint {
        OutPoint::new(TxId([n; 32]), 0)
    }

    #[test]
    fn test_two_viewpoints_agree() {
        let owner = KeyHash([1u8; 20]);
        let staker = KeyHash([2u8; 20]);
        let leaser = KeyHash([3u8; 20]);
        let mut registry = LeaseRegistry::new(3);
        registry
            .on_confirmed(op(1), Amount(500), &ClassifiedScript::ColdStake { owner, staker }, 1)
            .unwrap();
        registry
            .on_confirmed(op(2), Amount(700), &ClassifiedScript::Lease { owner, leaser }, 1)
            .unwrap();
        registry
            .on_confirmed(op(3), Amount(900), &ClassifiedScript::Lease { owner, leaser }, 4)
            .unwrap();
        registry.on_height_advance(4).unwrap();

        let owner_view = aggregate_balances(&registry, &[owner][..]);
        let leaser_view = aggregate_balances(&registry, &[leaser][..]);
        let staker_view = aggregate_balances(&registry, &[staker][..]);

        assert_eq!(owner_view.delegated_balance, Amount(500));
        assert_eq!(staker_view.cold_staking_balance, Amount(500));
        assert_eq!(owner_view.leased_balance, Amount(700));
        assert_eq!(owner_view.immature_leased_balance, Amount(900));
        assert_eq!(leaser_view.leasing_balance, owner_view.leased_balance);
        assert_eq!(leaser_view.immature_leasing_balance, owner_view.immature_leased_balance);
        assert_eq!(leaser_view.delegated_balance, Amount::ZERO);
    }

    #[test]
    fn test_snapshot_serializes_with_rpc_field_names() {
        let snapshot = WalletBalanceSnapshot {
            leased_balance: Amount(1),
            ..Default::default()
        };
        let value = serde_json::to_value(snapshot).unwrap();
        for field in [
            "delegated_balance",
            "immature_delegated_balance",
            "cold_staking_balance",
            "immature_cold_staking_balance",
            "leased_balance",
            "immature_leased_balance",
            "leasing_balance",
            "immature_leasing_balance",
        ] {
            assert!(value.get(field).is_some(), "{field}");
        }
    }
}
