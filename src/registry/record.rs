use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::data_structures::transaction::RewardSource;
use crate::data_structures::types::{Amount, BlockHeight, KeyHash, OutPoint};
use crate::validation::script_pattern::{ClassifiedScript, ScriptPattern};

/// Role of the counterparty named by a tracked output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseRole {
    /// Reward paid to the coin owner
    Owner,
    /// Cold-stake delegation
    Staker,
    /// Lease, or a reward paid to the leaser
    Leaser,
}

impl LeaseRole {
    /// Role implied by a classified script, `None` for scripts without lease
    /// semantics. The script of a reward output does not say which payout it
    /// is, so rewards default to [`LeaseRole::Owner`]; use
    /// [`LeaseRole::from_reward_source`] when the source is known.
    pub fn from_classified(classified: &ClassifiedScript) -> Option<Self> {
        match classified {
            ClassifiedScript::ColdStake { .. } => Some(LeaseRole::Staker),
            ClassifiedScript::Lease { .. } => Some(LeaseRole::Leaser),
            ClassifiedScript::LeaseReward { .. } => Some(LeaseRole::Owner),
            ClassifiedScript::Standard(_) | ClassifiedScript::Nonstandard(_) => None,
        }
    }

    pub fn from_reward_source(source: &RewardSource) -> Self {
        match source {
            RewardSource::Lease(_) => LeaseRole::Owner,
            RewardSource::Leaser(_) => LeaseRole::Leaser,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseState {
    Created,
    Immature,
    Mature,
    Spent,
}

impl Display for LeaseState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeaseState::Created => "created",
            LeaseState::Immature => "immature",
            LeaseState::Mature => "mature",
            LeaseState::Spent => "spent",
        };
        f.write_str(s)
    }
}

/// Registry entry for one cold-stake, lease or lease-reward output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub classification: ClassifiedScript,
    pub role: LeaseRole,
    pub confirmed_height: BlockHeight,
    pub maturity_height: BlockHeight,
    /// Height the next reward's age is measured from
    pub last_reward_height: BlockHeight,
    pub state: LeaseState,
    pub rewards_granted: u32,
}

impl LeaseRecord {
    pub fn new(
        outpoint: OutPoint,
        value: Amount,
        classification: ClassifiedScript,
        role: LeaseRole,
        confirmed_height: BlockHeight,
        maturity: BlockHeight,
    ) -> Self {
        let maturity_height = confirmed_height + maturity;
        Self {
            outpoint,
            value,
            classification,
            role,
            confirmed_height,
            maturity_height,
            last_reward_height: maturity_height,
            state: LeaseState::Created,
            rewards_granted: 0,
        }
    }

    pub fn pattern(&self) -> ScriptPattern {
        self.classification.pattern()
    }

    pub fn is_lease(&self) -> bool {
        matches!(self.classification, ClassifiedScript::Lease { .. })
    }

    pub fn is_mature(&self) -> bool {
        self.state == LeaseState::Mature
    }

    pub fn owner(&self) -> Option<KeyHash> {
        self.classification.owner()
    }

    pub fn counterparty(&self) -> Option<KeyHash> {
        self.classification.counterparty()
    }

    /// True when a reward for this lease may be included in the block at `height`
    pub fn is_due(&self, height: BlockHeight, reward_period: BlockHeight) -> bool {
        self.is_lease()
            && self.is_mature()
            && height >= self.last_reward_height.saturating_add(reward_period)
    }

    /// Blocks since the last reward, multiplier of the leasee payout
    pub fn age_factor(&self, height: BlockHeight) -> u64 {
        height.saturating_sub(self.last_reward_height)
    }
}
