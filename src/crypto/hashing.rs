//! Domain separated Blake2b digests used for identifiers and signatures

use blake2::{Blake2b, Digest};
use borsh::BorshSerialize;
use digest::consts::{U20, U32};

use crate::data_structures::types::KeyHash;

pub const KEY_HASH_DOMAIN: &[u8] = b"p2l.key_hash.v1";
pub const TXID_DOMAIN: &[u8] = b"p2l.txid.v1";
pub const SIGHASH_DOMAIN: &[u8] = b"p2l.sighash.v1";
pub const BLOCK_HASH_DOMAIN: &[u8] = b"p2l.block.v1";
pub const SPORK_DOMAIN: &[u8] = b"p2l.spork.v1";

/// 20-byte hash identifying a public key inside scripts and addresses
pub fn key_hash(public_key: &[u8]) -> KeyHash {
    let mut hasher = Blake2b::<U20>::new();
    hasher.update(KEY_HASH_DOMAIN);
    hasher.update(public_key);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    KeyHash(out)
}

/// Feeds borsh output straight into a digest
struct DigestWriter<'a, D: Digest>(&'a mut D);

impl<D: Digest> std::io::Write for DigestWriter<'_, D> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 32-byte digest of the canonical borsh encoding of `value`
///
/// Borsh serialization fails only on writer errors or on a sequence longer
/// than `u32::MAX` elements. [`DigestWriter`] never fails, and the hashed
/// values (transactions, blocks, spork payloads) hold far shorter sequences,
/// so encoding is infallible here.
pub fn domain_hash<T: BorshSerialize>(domain: &[u8], value: &T) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(domain);
    if let Err(_e) = value.serialize(&mut DigestWriter(&mut hasher)) {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %_e, "Borsh encoding failed while hashing");
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hash_is_deterministic_and_input_sensitive() {
        let a = key_hash(&[1u8; 32]);
        let b = key_hash(&[1u8; 32]);
        let c = key_hash(&[2u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_domain_hash_covers_full_encoding() {
        let value = (7u32, vec![1u8, 2, 3], true);
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(TXID_DOMAIN);
        hasher.update(borsh::to_vec(&value).unwrap());
        assert_eq!(domain_hash(TXID_DOMAIN, &value).as_slice(), hasher.finalize().as_slice());
        assert_ne!(
            domain_hash(TXID_DOMAIN, &value),
            domain_hash(TXID_DOMAIN, &(7u32, vec![1u8, 2], true))
        );
    }

    #[test]
    fn test_domains_separate_equal_payloads() {
        let value = 42u64;
        assert_ne!(
            domain_hash(TXID_DOMAIN, &value),
            domain_hash(SIGHASH_DOMAIN, &value)
        );
    }
}
