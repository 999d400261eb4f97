//! Hashing and signature primitives

pub mod hashing;
pub mod keys;

pub use hashing::{domain_hash, key_hash};
pub use keys::{verify_signature, KeyPair, PUBLIC_KEY_LEN, SIGNATURE_LEN};
