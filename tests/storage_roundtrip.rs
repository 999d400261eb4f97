//! Persisting the lease registry of a running chain
#![cfg(feature = "storage")]

mod common;

use std::path::PathBuf;

use common::Network;
use p2l_leasing_libs::wallet::{LeaseOptions, Wallet};
use p2l_leasing_libs::{Amount, LeaseState, SqliteLeaseStore};

fn temp_db(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("p2l_{name}_{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn leased_chain() -> Network {
    let mut net = Network::new();
    let mut owner = Wallet::from_seed(41);
    let mut leaser = Wallet::from_seed(42);
    net.fund(&mut owner, 3);
    net.enable_all_sporks();
    let leaser_address = leaser.get_new_leasing_address();
    for _ in 0..3 {
        owner
            .lease_to_address(
                &mut net.chain,
                &leaser_address.to_base58(),
                Amount::from_coins(120),
                None,
                LeaseOptions::default(),
            )
            .unwrap();
    }
    // Confirmed at 4, rewarded at 17
    net.mine(leaser_address.hash, true, 14);
    net
}

#[test]
fn test_registry_survives_reopen() {
    let net = leased_chain();
    let registry = net.chain.registry().clone();
    assert!(registry
        .records()
        .filter(|record| record.is_lease())
        .all(|record| record.state == LeaseState::Mature && record.rewards_granted == 1));

    let path = temp_db("reopen");
    {
        let mut store = SqliteLeaseStore::open(&path).unwrap();
        store.save_registry(&registry).unwrap();
        assert_eq!(store.record_count().unwrap(), registry.len());
        assert_eq!(store.journal_len().unwrap(), registry.journal().len());
    }

    let store = SqliteLeaseStore::open(&path).unwrap();
    let loaded = store.load_registry().unwrap().unwrap();
    assert_eq!(loaded, registry);
    assert_eq!(loaded.leasing_supply(), Amount::from_coins(360));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_loaded_registry_rolls_back_like_the_original() {
    let net = leased_chain();
    let mut original = net.chain.registry().clone();

    let mut store = SqliteLeaseStore::open_in_memory().unwrap();
    store.save_registry(&original).unwrap();
    let mut loaded = store.load_registry().unwrap().unwrap();

    // Unwinding the reward block and the maturity transitions
    let unwound = original.rollback_to(7).unwrap();
    assert_eq!(loaded.rollback_to(7).unwrap(), unwound);
    assert_eq!(loaded, original);
    assert!(loaded
        .records()
        .filter(|record| record.is_lease())
        .all(|record| record.state == LeaseState::Immature && record.rewards_granted == 0));

    store.save_registry(&loaded).unwrap();
    assert_eq!(store.load_registry().unwrap().unwrap(), original);
}
