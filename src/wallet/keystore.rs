//! Key storage indexed by key hash

use std::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};

use crate::crypto::KeyPair;
use crate::data_structures::types::KeyHash;
use crate::wallet::balance::KeyOwnership;

#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: BTreeMap<KeyHash, KeyPair>,
    /// Key hashes in creation order
    order: Vec<KeyHash>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and store a fresh key
    pub fn generate<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> KeyHash {
        self.insert(KeyPair::random(rng))
    }

    /// Store an existing key; inserting the same key twice is a no-op
    pub fn insert(&mut self, key: KeyPair) -> KeyHash {
        let hash = key.key_hash();
        if self.keys.insert(hash, key).is_none() {
            self.order.push(hash);
        }
        hash
    }

    pub fn get(&self, hash: &KeyHash) -> Option<&KeyPair> {
        self.keys.get(hash)
    }

    pub fn contains(&self, hash: &KeyHash) -> bool {
        self.keys.contains_key(hash)
    }

    pub fn key_hashes(&self) -> &[KeyHash] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl KeyOwnership for KeyStore {
    fn owns(&self, key_hash: &KeyHash) -> bool {
        self.contains(key_hash)
    }
}
