//! Shared fixtures for integration tests
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;

use p2l_leasing_libs::chain::{ChainBuilder, ChainState};
use p2l_leasing_libs::events::listeners::{MemoryEventHandle, MemoryEventListener};
use p2l_leasing_libs::params::{regtest_spork_key, ConsensusParams};
use p2l_leasing_libs::sporks::{SporkId, SporkMessage};
use p2l_leasing_libs::wallet::Wallet;
use p2l_leasing_libs::KeyHash;

pub struct Network {
    pub chain: ChainState,
    pub events: MemoryEventHandle,
    pub rng: StdRng,
    spork_time: u64,
}

impl Network {
    pub fn new() -> Self {
        Self::with_params(ConsensusParams::regtest())
    }

    pub fn with_params(params: ConsensusParams) -> Self {
        let listener = MemoryEventListener::new();
        let events = listener.handle();
        let chain = ChainBuilder::new()
            .with_params(params)
            .with_event_listener(Box::new(listener))
            .build()
            .unwrap();
        Self {
            chain,
            events,
            rng: StdRng::seed_from_u64(2024),
            spork_time: 0,
        }
    }

    pub fn set_spork(&mut self, id: SporkId, active: bool) {
        self.spork_time += 1;
        let message =
            SporkMessage::sign(&regtest_spork_key(), id, active, self.spork_time, &mut self.rng).unwrap();
        self.chain.apply_spork(&message).unwrap();
    }

    pub fn enable_all_sporks(&mut self) {
        for id in SporkId::ALL {
            self.set_spork(id, true);
        }
    }

    /// Mine `count` blocks, each paying a fresh address of `wallet`
    pub fn fund(&mut self, wallet: &mut Wallet, count: usize) {
        for _ in 0..count {
            let address = wallet.get_new_address();
            self.chain.generate_block(address.hash, false).unwrap();
        }
    }

    pub fn mine(&mut self, producer: KeyHash, claim_leasing: bool, count: usize) {
        for _ in 0..count {
            self.chain.generate_block(producer, claim_leasing).unwrap();
        }
    }
}
