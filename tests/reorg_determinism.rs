//! Disconnecting blocks must restore registry and UTXO state exactly, and
//! reconnecting the same history must reproduce the same rewards.

mod common;

use common::Network;
use p2l_leasing_libs::data_structures::{Block, RewardSource};
use p2l_leasing_libs::wallet::{LeaseOptions, Wallet};
use p2l_leasing_libs::{Amount, KeyHash, LeaseState, LeasingError};

/// Owner with five 249 coin leases to a leaser, confirmed at height 7
fn leased_network() -> (Network, Wallet, KeyHash) {
    let mut net = Network::new();
    let mut owner = Wallet::from_seed(11);
    let mut leaser = Wallet::from_seed(12);
    net.fund(&mut owner, 6);
    net.enable_all_sporks();

    let leaser_address = leaser.get_new_leasing_address();
    for _ in 0..5 {
        owner
            .lease_to_address(
                &mut net.chain,
                &leaser_address.to_base58(),
                Amount::from_coins(249),
                None,
                LeaseOptions::default(),
            )
            .unwrap();
    }
    net.mine(leaser_address.hash, true, 1);
    assert_eq!(net.chain.height(), 7);
    (net, owner, leaser_address.hash)
}

fn mine_to(net: &mut Network, producer: KeyHash, height: u64) -> Vec<Block> {
    let mut blocks = Vec::new();
    while net.chain.height() < height {
        blocks.push(net.chain.generate_block(producer, true).unwrap());
    }
    blocks
}

#[test]
fn test_rollback_restores_state_and_replay_is_identical() {
    let (mut net, _owner, leaser) = leased_network();
    mine_to(&mut net, leaser, 15);
    let registry_at_15 = net.chain.registry().clone();
    let utxos_at_15 = net.chain.utxos().clone();
    let tip_at_15 = net.chain.tip_hash();

    // First rewards are due at 7 + 3 + 10 = 20
    let original = mine_to(&mut net, leaser, 22);
    assert!(original.iter().any(|block| !block.rewards.is_empty()));

    let disconnected = net.chain.rollback_to(16).unwrap();
    assert_eq!(disconnected.len(), 7);
    assert_eq!(net.chain.height(), 15);
    assert_eq!(net.chain.tip_hash(), tip_at_15);
    assert_eq!(net.chain.registry(), &registry_at_15);
    assert_eq!(net.chain.utxos(), &utxos_at_15);
    assert_eq!(net.events.count_of_type("Reorg"), 1);

    let replayed = mine_to(&mut net, leaser, 22);
    assert_eq!(replayed, original);
}

#[test]
fn test_rollback_across_lease_confirmation() {
    let (mut net, owner, leaser) = leased_network();
    mine_to(&mut net, leaser, 21);
    let rewarded: Vec<_> = net
        .chain
        .registry()
        .records()
        .filter(|record| record.is_lease() && record.rewards_granted > 0)
        .map(|record| record.outpoint)
        .collect();
    assert_eq!(rewarded.len(), 5);

    // Disconnecting the confirmation block returns the leases to the mempool
    net.chain.rollback_to(7).unwrap();
    assert_eq!(net.chain.height(), 6);
    assert_eq!(net.chain.mempool().len(), 5);
    assert!(net.chain.registry().records().all(|record| !record.is_lease()));
    assert_eq!(owner.get_wallet_info(&net.chain).balances.immature_leased_balance, Amount::ZERO);

    // The same leases confirm again and earn the same first rewards
    mine_to(&mut net, leaser, 20);
    let block = net.chain.block_at(20).unwrap().clone();
    let leasee: Vec<_> = block
        .rewards
        .entries
        .iter()
        .filter_map(|entry| match entry.source {
            RewardSource::Lease(outpoint) => Some(outpoint),
            RewardSource::Leaser(_) => None,
        })
        .collect();
    assert_eq!(leasee.len(), 5);
    for outpoint in &rewarded {
        assert!(leasee.contains(outpoint));
        assert_eq!(net.chain.registry().get(outpoint).unwrap().state, LeaseState::Mature);
    }
}

#[test]
fn test_competing_branch_without_claim_defers_rewards() {
    let (mut net, _owner, leaser) = leased_network();
    mine_to(&mut net, leaser, 20);
    assert!(!net.chain.block_at(20).unwrap().rewards.is_empty());

    // Replace block 20 with one whose producer does not claim leasing rewards
    net.chain.disconnect_tip().unwrap();
    let other = KeyHash([0x42; 20]);
    let block = net.chain.generate_block(other, false).unwrap();
    assert!(block.rewards.is_empty());
    assert!(net
        .chain
        .registry()
        .records()
        .filter(|record| record.is_lease())
        .all(|record| record.rewards_granted == 0 && record.last_reward_height == 10));

    // The next claiming block pays them with one more block of age
    let block = net.chain.generate_block(leaser, true).unwrap();
    let ages: Vec<u64> = net
        .events
        .events_of_type("RewardGranted")
        .into_iter()
        .filter_map(|event| match event {
            p2l_leasing_libs::events::LeasingEvent::RewardGranted { reward, .. }
                if reward.block_height == 21 && matches!(reward.source, RewardSource::Lease(_)) =>
            {
                Some(reward.age_factor)
            }
            _ => None,
        })
        .collect();
    assert_eq!(block.height(), 21);
    assert_eq!(ages, vec![11; 5]);
}

#[test]
fn test_rollback_to_zero_is_rejected() {
    let (mut net, _owner, _leaser) = leased_network();
    assert!(matches!(
        net.chain.rollback_to(0),
        Err(LeasingError::InvalidBlock { .. })
    ));
    assert_eq!(net.chain.height(), 7);
}
