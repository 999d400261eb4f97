//! Consensus and deployment parameters
//!
//! Parameters are plain serde data so a deployment can be described in a JSON
//! file. The regtest preset reproduces the constants of the reference test
//! network; the mainnet preset requires a spork key to be supplied.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crypto::keys::KeyPair;
use crate::data_structures::types::{Amount, BlockHeight};
use crate::errors::ParamsError;
use crate::rewards::schedule::RewardSchedule;

const REGTEST_SPORK_SEED: u64 = 0x5350_4f52_4b00_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Regtest,
    Mainnet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub network: Network,
    /// Blocks between a lease's confirmation and its maturity
    pub leasing_maturity: BlockHeight,
    /// Minimum blocks between two rewards of one lease
    pub leasing_reward_period: BlockHeight,
    /// Maximum leasee rewards per block
    pub max_leasing_rewards: usize,
    pub min_leasing_amount: Amount,
    pub min_delegation_amount: Amount,
    pub block_subsidy: Amount,
    pub default_fee: Amount,
    pub reward_schedule: RewardSchedule,
    /// Hex encoded public key that signs spork messages
    #[serde(default)]
    pub spork_public_key: String,
}

/// Deterministic spork signing key of regtest networks
pub fn regtest_spork_key() -> KeyPair {
    let mut rng = StdRng::seed_from_u64(REGTEST_SPORK_SEED);
    KeyPair::random(&mut rng)
}

impl ConsensusParams {
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            leasing_maturity: 3,
            leasing_reward_period: 10,
            max_leasing_rewards: 10,
            min_leasing_amount: Amount::from_coins(1),
            min_delegation_amount: Amount::from_coins(1),
            block_subsidy: Amount::from_coins(250),
            default_fee: Amount(5_000),
            reward_schedule: RewardSchedule::default(),
            spork_public_key: hex::encode(regtest_spork_key().public_key_bytes()),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            leasing_maturity: 30,
            leasing_reward_period: 7 * 24 * 60,
            max_leasing_rewards: 100,
            min_leasing_amount: Amount::from_coins(1),
            min_delegation_amount: Amount::from_coins(1),
            block_subsidy: Amount::from_coins(250),
            default_fee: Amount(5_000),
            reward_schedule: RewardSchedule::Tiered,
            spork_public_key: String::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ParamsError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| ParamsError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ParamsError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ParamsError::Io(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, ParamsError> {
        serde_json::to_string_pretty(self).map_err(|e| ParamsError::Parse(e.to_string()))
    }

    pub fn with_leasing_maturity(mut self, blocks: BlockHeight) -> Self {
        self.leasing_maturity = blocks;
        self
    }

    pub fn with_leasing_reward_period(mut self, blocks: BlockHeight) -> Self {
        self.leasing_reward_period = blocks;
        self
    }

    pub fn with_max_leasing_rewards(mut self, cap: usize) -> Self {
        self.max_leasing_rewards = cap;
        self
    }

    pub fn with_min_leasing_amount(mut self, amount: Amount) -> Self {
        self.min_leasing_amount = amount;
        self
    }

    pub fn with_reward_schedule(mut self, schedule: RewardSchedule) -> Self {
        self.reward_schedule = schedule;
        self
    }

    pub fn with_spork_public_key(mut self, public_key: &[u8]) -> Self {
        self.spork_public_key = hex::encode(public_key);
        self
    }

    pub fn spork_public_key_bytes(&self) -> Result<Vec<u8>, ParamsError> {
        hex::decode(&self.spork_public_key).map_err(|e| ParamsError::Invalid {
            field: "spork_public_key".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        let invalid = |field: &str, reason: &str| ParamsError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        if self.leasing_reward_period == 0 {
            return Err(invalid("leasing_reward_period", "must be positive"));
        }
        if self.max_leasing_rewards == 0 {
            return Err(invalid("max_leasing_rewards", "must be positive"));
        }
        if self.spork_public_key.is_empty() {
            return Err(invalid("spork_public_key", "is not configured"));
        }
        self.spork_public_key_bytes()?;
        Ok(())
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::regtest()
    }
}
