//! Script classification
//!
//! Every locking script is parsed by a single total function into a
//! [`ClassifiedScript`]. Templates are described as token sequences and the
//! same description drives both parsing and serialization, so a classified
//! script always re-serializes to the bytes it was parsed from.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::data_structures::script::opcodes::*;
use crate::data_structures::script::Script;
use crate::data_structures::types::KeyHash;
use crate::sporks::SporkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Op(u8),
    Push20,
}

use Token::{Op, Push20};

const STANDARD_TEMPLATE: &[Token] = &[
    Op(OP_DUP),
    Op(OP_HASH160),
    Push20,
    Op(OP_EQUALVERIFY),
    Op(OP_CHECKSIG),
];

/// Hashes in order: staker, owner
const COLD_STAKE_TEMPLATE: &[Token] = &[
    Op(OP_DUP),
    Op(OP_HASH160),
    Op(OP_ROT),
    Op(OP_IF),
    Op(OP_CHECKCOLDSTAKEVERIFY),
    Push20,
    Op(OP_ELSE),
    Push20,
    Op(OP_ENDIF),
    Op(OP_EQUALVERIFY),
    Op(OP_CHECKSIG),
];

/// Hashes in order: leaser, owner
const LEASE_TEMPLATE: &[Token] = &[
    Op(OP_DUP),
    Op(OP_HASH160),
    Op(OP_ROT),
    Op(OP_IF),
    Op(OP_CHECKLEASEVERIFY),
    Push20,
    Op(OP_ELSE),
    Push20,
    Op(OP_ENDIF),
    Op(OP_EQUALVERIFY),
    Op(OP_CHECKSIG),
];

/// Hashes in order: leaser, payee
const LEASE_REWARD_TEMPLATE: &[Token] = &[
    Op(OP_LEASINGREWARD),
    Push20,
    Op(OP_DROP),
    Op(OP_DUP),
    Op(OP_HASH160),
    Push20,
    Op(OP_EQUALVERIFY),
    Op(OP_CHECKSIG),
];

fn match_template(bytes: &[u8], template: &[Token]) -> Option<Vec<KeyHash>> {
    let mut hashes = Vec::with_capacity(2);
    let mut pos = 0usize;
    for token in template {
        match token {
            Op(op) => {
                if bytes.get(pos) != Some(op) {
                    return None;
                }
                pos += 1;
            }
            Push20 => {
                if bytes.get(pos) != Some(&OP_PUSH20) {
                    return None;
                }
                let hash = KeyHash::from_slice(bytes.get(pos + 1..pos + 1 + KeyHash::LEN)?)?;
                hashes.push(hash);
                pos += 1 + KeyHash::LEN;
            }
        }
    }
    (pos == bytes.len()).then_some(hashes)
}

fn emit_template(template: &[Token], hashes: &[KeyHash]) -> Script {
    let mut bytes = Vec::with_capacity(template.len() + hashes.len() * KeyHash::LEN);
    let mut hashes = hashes.iter();
    for token in template {
        match token {
            Op(op) => bytes.push(*op),
            Push20 => {
                bytes.push(OP_PUSH20);
                if let Some(hash) = hashes.next() {
                    bytes.extend_from_slice(hash.as_bytes());
                }
            }
        }
    }
    Script::new(bytes)
}

/// Semantic reading of a locking script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifiedScript {
    /// Pay to the key hash
    Standard(KeyHash),
    /// Owner keeps spend rights, staker may only stake with it
    ColdStake { owner: KeyHash, staker: KeyHash },
    /// Owner keeps spend rights, leaser may only generate rewards with it
    Lease { owner: KeyHash, leaser: KeyHash },
    /// Minted leasing reward. `owner` is the payee named by this output,
    /// `leaser` the counterparty of the lease relationship.
    LeaseReward { owner: KeyHash, leaser: KeyHash },
    /// Anything else, kept verbatim
    Nonstandard(Script),
}

impl ClassifiedScript {
    pub fn pattern(&self) -> ScriptPattern {
        match self {
            ClassifiedScript::Standard(_) => ScriptPattern::Standard,
            ClassifiedScript::ColdStake { .. } => ScriptPattern::ColdStake,
            ClassifiedScript::Lease { .. } => ScriptPattern::Lease,
            ClassifiedScript::LeaseReward { .. } => ScriptPattern::LeaseReward,
            ClassifiedScript::Nonstandard(_) => ScriptPattern::Nonstandard,
        }
    }

    /// Key hash holding spend rights
    pub fn owner(&self) -> Option<KeyHash> {
        match self {
            ClassifiedScript::Standard(owner)
            | ClassifiedScript::ColdStake { owner, .. }
            | ClassifiedScript::Lease { owner, .. }
            | ClassifiedScript::LeaseReward { owner, .. } => Some(*owner),
            ClassifiedScript::Nonstandard(_) => None,
        }
    }

    /// Staker or leaser named by a delegation script
    pub fn counterparty(&self) -> Option<KeyHash> {
        match self {
            ClassifiedScript::ColdStake { staker, .. } => Some(*staker),
            ClassifiedScript::Lease { leaser, .. }
            | ClassifiedScript::LeaseReward { leaser, .. } => Some(*leaser),
            ClassifiedScript::Standard(_) | ClassifiedScript::Nonstandard(_) => None,
        }
    }

    /// True when `hash` appears in the script in any role
    pub fn involves(&self, hash: &KeyHash) -> bool {
        self.owner().as_ref() == Some(hash) || self.counterparty().as_ref() == Some(hash)
    }

    /// Feature flag that must be active for an output of this kind to be created
    pub fn gating_spork(&self) -> Option<SporkId> {
        match self {
            ClassifiedScript::ColdStake { .. } => Some(SporkId::ColdStakingEnforcement),
            ClassifiedScript::Lease { .. } | ClassifiedScript::LeaseReward { .. } => {
                Some(SporkId::LeasingEnforcement)
            }
            ClassifiedScript::Standard(_) | ClassifiedScript::Nonstandard(_) => None,
        }
    }

    pub fn to_script(&self) -> Script {
        match self {
            ClassifiedScript::Standard(hash) => emit_template(STANDARD_TEMPLATE, &[*hash]),
            ClassifiedScript::ColdStake { owner, staker } => {
                emit_template(COLD_STAKE_TEMPLATE, &[*staker, *owner])
            }
            ClassifiedScript::Lease { owner, leaser } => {
                emit_template(LEASE_TEMPLATE, &[*leaser, *owner])
            }
            ClassifiedScript::LeaseReward { owner, leaser } => {
                emit_template(LEASE_REWARD_TEMPLATE, &[*leaser, *owner])
            }
            ClassifiedScript::Nonstandard(script) => script.clone(),
        }
    }
}

impl From<&ClassifiedScript> for Script {
    fn from(classified: &ClassifiedScript) -> Self {
        classified.to_script()
    }
}

/// Classify a locking script. Total: unrecognised bytes become `Nonstandard`.
pub fn classify(script: &Script) -> ClassifiedScript {
    classify_bytes(script.as_bytes())
}

pub fn classify_bytes(bytes: &[u8]) -> ClassifiedScript {
    if let Some(h) = match_template(bytes, STANDARD_TEMPLATE) {
        return ClassifiedScript::Standard(h[0]);
    }
    if let Some(h) = match_template(bytes, COLD_STAKE_TEMPLATE) {
        return ClassifiedScript::ColdStake {
            staker: h[0],
            owner: h[1],
        };
    }
    if let Some(h) = match_template(bytes, LEASE_TEMPLATE) {
        return ClassifiedScript::Lease {
            leaser: h[0],
            owner: h[1],
        };
    }
    if let Some(h) = match_template(bytes, LEASE_REWARD_TEMPLATE) {
        return ClassifiedScript::LeaseReward {
            leaser: h[0],
            owner: h[1],
        };
    }
    ClassifiedScript::Nonstandard(Script::new(bytes.to_vec()))
}

/// Template family of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptPattern {
    Standard,
    ColdStake,
    Lease,
    LeaseReward,
    Nonstandard,
}

impl Display for ScriptPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScriptPattern::Standard => "pubkeyhash",
            ScriptPattern::ColdStake => "coldstake",
            ScriptPattern::Lease => "leasing",
            ScriptPattern::LeaseReward => "leasingreward",
            ScriptPattern::Nonstandard => "nonstandard",
        };
        write!(f, "{name}")
    }
}
