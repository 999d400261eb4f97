//! Leasing rewards: rate schedule, per-block computation and validation

pub mod schedule;
pub mod scheduler;

use serde::{Deserialize, Serialize};

use crate::data_structures::transaction::RewardSource;
use crate::data_structures::types::{Amount, BlockHeight, KeyHash};
use crate::registry::LeaseRole;

pub use schedule::{LeaseeRateInputs, RateFraction, RewardSchedule, BPS_DENOMINATOR};
pub use scheduler::RewardScheduler;

/// Minutes in a 365 day year; one block per minute
pub const MINUTES_PER_YEAR: u64 = 365 * 24 * 60;

/// One reward paid by a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub block_height: BlockHeight,
    pub source: RewardSource,
    pub reward_amount: Amount,
    pub recipient: KeyHash,
    pub recipient_role: LeaseRole,
    /// Leaser of the relationship
    pub counterparty: KeyHash,
    /// Blocks since the previous reward; zero for leaser payouts
    pub age_factor: u64,
}
