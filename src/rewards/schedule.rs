//! Leasing reward rates
//!
//! Rates are exact fractions so that payouts are computed with a single final
//! integer division. Percentages are expressed in basis points.

use serde::{Deserialize, Serialize};

use crate::data_structures::transaction::LeaserRole;
use crate::data_structures::types::{Amount, BlockHeight, COIN};

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Exact rate `numerator / denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateFraction {
    pub numerator: u128,
    pub denominator: u128,
}

impl RateFraction {
    pub const ZERO: RateFraction = RateFraction {
        numerator: 0,
        denominator: 1,
    };

    pub fn from_bps(bps: u64) -> Self {
        Self {
            numerator: bps as u128,
            denominator: BPS_DENOMINATOR as u128,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// `value * self`, truncated
    pub fn apply(&self, value: Amount) -> Amount {
        if self.denominator == 0 {
            return Amount::ZERO;
        }
        u128::from(value.as_u64())
            .checked_mul(self.numerator)
            .and_then(|scaled| u64::try_from(scaled / self.denominator).ok())
            .map_or(Amount(u64::MAX), Amount)
    }
}

/// Inputs of the leasee annual rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseeRateInputs {
    pub height: BlockHeight,
    /// Value of all active leases on the network
    pub leasing_supply: Amount,
    /// Average value of the owner's eligible inputs
    pub input_value: Amount,
    /// Blocks since the lease was confirmed
    pub lease_age: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardSchedule {
    /// Constant annual rate and per-block leaser rates
    Flat {
        annual_rate_bps: u64,
        leaser_bps: u64,
        service_node_bps: u64,
    },
    /// Height, supply, amount and age dependent curve
    Tiered,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        RewardSchedule::Flat {
            annual_rate_bps: 1500,
            leaser_bps: 20,
            service_node_bps: 10,
        }
    }
}

const HEIGHT_STEP: u64 = 500_000;

// (exclusive upper bound, bps)
const SUPPLY_TIERS_COINS: &[(u64, u64)] = &[
    (500_000, 10_000),
    (1_000_000, 9_500),
    (2_000_000, 9_000),
    (3_000_000, 8_500),
    (4_000_000, 8_000),
    (5_000_000, 7_500),
    (6_000_000, 7_000),
    (7_000_000, 6_500),
    (8_000_000, 6_000),
    (9_000_000, 5_500),
    (10_000_000, 5_000),
    (u64::MAX, 4_500),
];

const AMOUNT_TIERS_COINS: &[(u64, u64)] = &[
    (5_000, 10_000),
    (10_000, 9_500),
    (20_000, 9_000),
    (50_000, 8_500),
    (100_000, 8_000),
    (200_000, 7_500),
    (300_000, 7_000),
    (400_000, 6_500),
    (500_000, 6_000),
    (1_000_000, 5_500),
    (u64::MAX, 5_000),
];

const AGE_TIERS_BLOCKS: &[(u64, u64)] = &[
    (30_000, 10_000),
    (90_000, 11_000),
    (180_000, 12_000),
    (270_000, 13_000),
    (360_000, 14_000),
    (540_000, 15_000),
    (720_000, 16_000),
    (1_080_000, 17_000),
    (1_440_000, 18_000),
    (1_800_000, 19_000),
    (u64::MAX, 20_000),
];

const LEASER_BALANCE_BOUNDS_COINS: [u64; 10] = [
    30_000, 90_000, 180_000, 270_000, 360_000, 540_000, 720_000, 1_080_000, 1_440_000, 1_800_000,
];
const ORDINARY_LEASER_BPS: [u64; 10] = [20, 18, 16, 14, 12, 10, 8, 6, 4, 2];
const SERVICE_NODE_LEASER_BPS: [u64; 10] = [10, 9, 8, 7, 6, 5, 4, 3, 2, 1];

fn tier(tiers: &[(u64, u64)], value: u64) -> u64 {
    tiers
        .iter()
        .find(|(bound, _)| value < *bound)
        .map(|(_, bps)| *bps)
        .unwrap_or(0)
}

/// Height component of the tiered annual rate: 15% stepping down to 1%
pub fn height_rate_bps(height: BlockHeight) -> u64 {
    let step = height / HEIGHT_STEP;
    15u64.saturating_sub(step).max(1) * 100
}

impl RewardSchedule {
    /// Annual leasee rate
    pub fn leasee_rate(&self, inputs: &LeaseeRateInputs) -> RateFraction {
        match self {
            RewardSchedule::Flat {
                annual_rate_bps, ..
            } => RateFraction::from_bps(*annual_rate_bps),
            RewardSchedule::Tiered => {
                let supply = tier(SUPPLY_TIERS_COINS, inputs.leasing_supply.as_u64() / COIN);
                let amount = tier(AMOUNT_TIERS_COINS, inputs.input_value.as_u64() / COIN);
                let age = tier(AGE_TIERS_BLOCKS, inputs.lease_age);
                let bps = BPS_DENOMINATOR as u128;
                RateFraction {
                    numerator: height_rate_bps(inputs.height) as u128
                        * supply as u128
                        * amount as u128
                        * age as u128,
                    denominator: bps * bps * bps * bps,
                }
            }
        }
    }

    /// Per-block leaser rate for a leaser holding `leasing_balance` in leases
    pub fn leaser_rate(&self, role: LeaserRole, leasing_balance: Amount) -> RateFraction {
        match self {
            RewardSchedule::Flat {
                leaser_bps,
                service_node_bps,
                ..
            } => match role {
                LeaserRole::Ordinary => RateFraction::from_bps(*leaser_bps),
                LeaserRole::ServiceNode => RateFraction::from_bps(*service_node_bps),
            },
            RewardSchedule::Tiered => {
                let coins = leasing_balance.as_u64() / COIN;
                let table = match role {
                    LeaserRole::Ordinary => &ORDINARY_LEASER_BPS,
                    LeaserRole::ServiceNode => &SERVICE_NODE_LEASER_BPS,
                };
                LEASER_BALANCE_BOUNDS_COINS
                    .iter()
                    .position(|bound| coins < *bound)
                    .map(|i| RateFraction::from_bps(table[i]))
                    .unwrap_or(RateFraction::ZERO)
            }
        }
    }
}
