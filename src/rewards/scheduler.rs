//! Per-block leasing reward computation and validation

use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::data_structures::transaction::{
    LeaserRole, RewardEntry, RewardSource, RewardTransaction, TxOut,
};
use crate::data_structures::types::{Amount, BlockHeight, KeyHash};
use crate::errors::{LeasingError, LeasingResult};
use crate::params::ConsensusParams;
use crate::registry::{LeaseRegistry, LeaseRole};
use crate::rewards::schedule::{LeaseeRateInputs, RateFraction, RewardSchedule};
use crate::rewards::{RewardEvent, MINUTES_PER_YEAR};
use crate::sporks::{SporkId, SporkSnapshot};
use crate::validation::script_pattern::ClassifiedScript;

/// `balance * rate * age_factor / (MINUTES_PER_YEAR * inputs)`, truncated.
/// `None` when an intermediate product leaves `u128` or the result leaves `u64`.
fn leasee_payout(balance: Amount, rate: RateFraction, age_factor: u64, inputs: u64) -> Option<Amount> {
    let numerator = u128::from(balance.as_u64())
        .checked_mul(rate.numerator)?
        .checked_mul(u128::from(age_factor))?;
    let denominator = rate
        .denominator
        .checked_mul(u128::from(MINUTES_PER_YEAR))?
        .checked_mul(u128::from(inputs))?;
    let payout = numerator.checked_div(denominator)?;
    u64::try_from(payout).ok().map(Amount)
}

/// Reward parameters copied out of [`ConsensusParams`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardScheduler {
    reward_period: BlockHeight,
    max_rewards: usize,
    schedule: RewardSchedule,
}

impl RewardScheduler {
    pub fn new(reward_period: BlockHeight, max_rewards: usize, schedule: RewardSchedule) -> Self {
        Self {
            reward_period,
            max_rewards,
            schedule,
        }
    }

    pub fn from_params(params: &ConsensusParams) -> Self {
        Self::new(
            params.leasing_reward_period,
            params.max_leasing_rewards,
            params.reward_schedule.clone(),
        )
    }

    pub fn max_rewards(&self) -> usize {
        self.max_rewards
    }

    /// Rewards the block at `height` must pay for leases naming `leaser`.
    ///
    /// `registry` must reflect the chain up to the parent block. Leasee
    /// rewards are selected oldest lease first and capped per block; a leaser
    /// payout follows when at least one leasee reward is paid.
    pub fn compute_rewards(
        &self,
        registry: &LeaseRegistry,
        height: BlockHeight,
        leaser: &KeyHash,
        role: LeaserRole,
        sporks: SporkSnapshot,
    ) -> Vec<RewardEvent> {
        if !sporks.leasing_active || height == 0 {
            return Vec::new();
        }
        let parent = height - 1;
        let leasing_supply = registry.leasing_supply();
        let mut owner_stats: BTreeMap<KeyHash, (Amount, u64)> = BTreeMap::new();
        let mut events = Vec::new();

        for record in registry.mature_leases_for(leaser, parent) {
            if events.len() >= self.max_rewards {
                break;
            }
            if !record.is_due(height, self.reward_period) {
                continue;
            }
            let Some(owner) = record.owner() else {
                continue;
            };
            let (balance, inputs) = *owner_stats
                .entry(owner)
                .or_insert_with(|| registry.owner_lease_stats(&owner, parent));
            if inputs == 0 {
                continue;
            }

            let age_factor = record.age_factor(height);
            let rate = self.schedule.leasee_rate(&LeaseeRateInputs {
                height,
                leasing_supply,
                input_value: Amount(balance.as_u64() / inputs),
                lease_age: height.saturating_sub(record.confirmed_height),
            });
            let Some(payout) = leasee_payout(balance, rate, age_factor, inputs) else {
                #[cfg(feature = "tracing")]
                warn!(height, outpoint = %record.outpoint, "Leasee payout out of range, skipped");
                continue;
            };
            if payout.is_zero() {
                continue;
            }

            events.push(RewardEvent {
                block_height: height,
                source: RewardSource::Lease(record.outpoint),
                reward_amount: payout,
                recipient: owner,
                recipient_role: LeaseRole::Owner,
                counterparty: *leaser,
                age_factor,
            });
        }

        if !events.is_empty() {
            let leasing_balance = registry.total_leased_to(leaser);
            let payout = self
                .schedule
                .leaser_rate(role, leasing_balance)
                .apply(leasing_balance);
            if !payout.is_zero() {
                events.push(RewardEvent {
                    block_height: height,
                    source: RewardSource::Leaser(role),
                    reward_amount: payout,
                    recipient: *leaser,
                    recipient_role: LeaseRole::Leaser,
                    counterparty: *leaser,
                    age_factor: 0,
                });
            }
        }

        #[cfg(feature = "tracing")]
        debug!(height, leaser = %leaser, rewards = events.len(), "Computed leasing rewards");
        events
    }

    /// Reward transaction paying `events`
    pub fn build_reward_transaction(height: BlockHeight, events: &[RewardEvent]) -> RewardTransaction {
        RewardTransaction::new(height, events.iter().map(RewardEvent::to_entry).collect())
    }

    /// Check that `rewards` is exactly what the scheduler computes for the block
    pub fn validate_rewards(
        &self,
        registry: &LeaseRegistry,
        height: BlockHeight,
        leaser: Option<&KeyHash>,
        role: LeaserRole,
        sporks: SporkSnapshot,
        rewards: &RewardTransaction,
    ) -> LeasingResult<Vec<RewardEvent>> {
        if !sporks.leasing_active && !rewards.is_empty() {
            return Err(LeasingError::PolicyDisabled {
                feature: SporkId::LeasingEnforcement,
            });
        }
        if rewards.height != height {
            return Err(LeasingError::reward_mismatch(
                height,
                format!("reward transaction declares height {}", rewards.height),
            ));
        }

        let expected = match leaser {
            Some(leaser) => self.compute_rewards(registry, height, leaser, role, sporks),
            None => Vec::new(),
        };
        if rewards.entries.len() != expected.len() {
            #[cfg(feature = "tracing")]
            warn!(
                height,
                expected = expected.len(),
                actual = rewards.entries.len(),
                "Reward count mismatch"
            );
            return Err(LeasingError::reward_mismatch(
                height,
                format!(
                    "expected {} reward outputs, found {}",
                    expected.len(),
                    rewards.entries.len()
                ),
            ));
        }
        for (index, (actual, event)) in rewards.entries.iter().zip(&expected).enumerate() {
            if *actual != event.to_entry() {
                return Err(LeasingError::reward_mismatch(
                    height,
                    format!(
                        "reward output {index} pays {} for {:?}, expected {} for {:?}",
                        actual.output.value, actual.source, event.reward_amount, event.source
                    ),
                ));
            }
        }
        Ok(expected)
    }
}

impl RewardEvent {
    pub fn to_entry(&self) -> RewardEntry {
        let script = ClassifiedScript::LeaseReward {
            owner: self.recipient,
            leaser: self.counterparty,
        }
        .to_script();
        RewardEntry {
            source: self.source,
            output: TxOut::new(self.reward_amount, script),
        }
    }
}
