//! Network feature flags ("sporks")
//!
//! Sporks are activated and deactivated by messages signed with the network
//! spork key. The [`SporkManager`] is shared process-wide and applies messages
//! monotonically per spork; validation reads an immutable [`SporkSnapshot`]
//! once per block so that a flag flip cannot change a block already in
//! progress.

use borsh::{BorshDeserialize, BorshSerialize};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::crypto::hashing::{domain_hash, SPORK_DOMAIN};
use crate::crypto::keys::{verify_signature, KeyPair};
use crate::errors::{CryptoError, SporkError};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub enum SporkId {
    ColdStakingEnforcement,
    LeasingEnforcement,
}

impl SporkId {
    pub const ALL: [SporkId; 2] = [SporkId::ColdStakingEnforcement, SporkId::LeasingEnforcement];

    pub const fn number(self) -> u32 {
        match self {
            SporkId::ColdStakingEnforcement => 10017,
            SporkId::LeasingEnforcement => 11017,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SporkId::ColdStakingEnforcement => "SPORK_17_COLDSTAKING_ENFORCEMENT",
            SporkId::LeasingEnforcement => "SPORK_1017_LEASING_ENFORCEMENT",
        }
    }
}

impl Display for SporkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SporkId {
    type Err = SporkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SporkId::ALL
            .into_iter()
            .find(|id| id.name() == s || id.number().to_string() == s)
            .ok_or_else(|| SporkError::UnknownSpork(s.to_string()))
    }
}

/// Signed activation or deactivation of one spork
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporkMessage {
    pub id: SporkId,
    pub active: bool,
    pub time_signed: u64,
    pub signature: Vec<u8>,
}

impl SporkMessage {
    fn payload(id: SporkId, active: bool, time_signed: u64) -> [u8; 32] {
        domain_hash(SPORK_DOMAIN, &(id.number(), active, time_signed))
    }

    pub fn sign<R: RngCore + CryptoRng>(
        key: &KeyPair,
        id: SporkId,
        active: bool,
        time_signed: u64,
        rng: &mut R,
    ) -> Result<Self, CryptoError> {
        let signature = key.sign(&Self::payload(id, active, time_signed), rng)?;
        Ok(Self {
            id,
            active,
            time_signed,
            signature,
        })
    }

    pub fn verify(&self, spork_public_key: &[u8]) -> bool {
        let payload = Self::payload(self.id, self.active, self.time_signed);
        matches!(
            verify_signature(spork_public_key, &self.signature, &payload),
            Ok(true)
        )
    }
}

/// Spork values frozen for one block validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SporkSnapshot {
    pub cold_staking_active: bool,
    pub leasing_active: bool,
}

impl SporkSnapshot {
    pub const fn all_active() -> Self {
        Self {
            cold_staking_active: true,
            leasing_active: true,
        }
    }

    pub fn is_active(&self, id: SporkId) -> bool {
        match id {
            SporkId::ColdStakingEnforcement => self.cold_staking_active,
            SporkId::LeasingEnforcement => self.leasing_active,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AppliedSpork {
    active: bool,
    time_signed: u64,
}

#[derive(Debug, Default)]
struct SporkState {
    applied: BTreeMap<SporkId, AppliedSpork>,
}

/// Shared spork state
#[derive(Debug, Clone)]
pub struct SporkManager {
    spork_public_key: Vec<u8>,
    state: Arc<RwLock<SporkState>>,
}

impl SporkManager {
    /// Manager accepting messages signed by `spork_public_key`. All sporks start inactive.
    pub fn new(spork_public_key: Vec<u8>) -> Self {
        Self {
            spork_public_key,
            state: Arc::new(RwLock::new(SporkState::default())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SporkState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SporkState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Verify and apply a spork message. Only messages signed later than the
    /// last applied message for the same spork are accepted.
    pub fn apply(&self, message: &SporkMessage) -> Result<(), SporkError> {
        if self.spork_public_key.is_empty() {
            return Err(SporkError::MissingKey);
        }
        if !message.verify(&self.spork_public_key) {
            return Err(SporkError::InvalidSignature(message.id));
        }

        let mut state = self.write();
        if let Some(previous) = state.applied.get(&message.id) {
            if message.time_signed <= previous.time_signed {
                return Err(SporkError::StaleMessage {
                    id: message.id,
                    time_signed: message.time_signed,
                    last_applied: previous.time_signed,
                });
            }
        }
        state.applied.insert(
            message.id,
            AppliedSpork {
                active: message.active,
                time_signed: message.time_signed,
            },
        );

        #[cfg(feature = "tracing")]
        info!(
            spork = %message.id,
            active = message.active,
            time_signed = message.time_signed,
            "Applied spork message"
        );
        Ok(())
    }

    pub fn is_active(&self, id: SporkId) -> bool {
        self.read()
            .applied
            .get(&id)
            .map(|applied| applied.active)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> SporkSnapshot {
        let state = self.read();
        let active = |id: SporkId| state.applied.get(&id).map(|a| a.active).unwrap_or(false);
        let snapshot = SporkSnapshot {
            cold_staking_active: active(SporkId::ColdStakingEnforcement),
            leasing_active: active(SporkId::LeasingEnforcement),
        };
        #[cfg(feature = "tracing")]
        debug!(?snapshot, "Spork snapshot taken");
        snapshot
    }
}
