//! Key pairs and Schnorr signatures over Ristretto

use rand_core::{CryptoRng, RngCore};
use tari_crypto::keys::{PublicKey, SecretKey};
use tari_crypto::ristretto::{RistrettoPublicKey, RistrettoSchnorr, RistrettoSecretKey};
use tari_utilities::ByteArray;

use crate::crypto::hashing::key_hash;
use crate::data_structures::transaction::{Transaction, Witness};
use crate::data_structures::types::KeyHash;
use crate::errors::CryptoError;

/// Length of an encoded public key
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of an encoded signature (public nonce followed by the scalar)
pub const SIGNATURE_LEN: usize = 64;

/// A secret key with its public key
#[derive(Clone)]
pub struct KeyPair {
    secret: RistrettoSecretKey,
    public: RistrettoPublicKey,
}

impl KeyPair {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = RistrettoSecretKey::random(rng);
        let public = RistrettoPublicKey::from_secret_key(&secret);
        Self { secret, public }
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    pub fn key_hash(&self) -> KeyHash {
        key_hash(self.public.as_bytes())
    }

    /// Sign `message`, returning the 64-byte signature encoding
    pub fn sign<R: RngCore + CryptoRng>(
        &self,
        message: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let signature = RistrettoSchnorr::sign(&self.secret, message, rng)
            .map_err(|e| CryptoError::SigningFailed(format!("{e:?}")))?;
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(signature.get_public_nonce().as_bytes());
        out.extend_from_slice(signature.get_signature().as_bytes());
        Ok(out)
    }

    /// Witness for input `index` of `tx`
    pub fn sign_input<R: RngCore + CryptoRng>(
        &self,
        tx: &Transaction,
        index: usize,
        rng: &mut R,
    ) -> Result<Witness, CryptoError> {
        Ok(Witness {
            public_key: self.public_key_bytes(),
            signature: self.sign(&tx.sighash(index), rng)?,
        })
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_hash", &self.key_hash())
            .finish_non_exhaustive()
    }
}

/// Check a signature produced by [`KeyPair::sign`]
///
/// Malformed encodings are errors; a well formed signature that does not
/// match returns `Ok(false)`.
pub fn verify_signature(
    public_key: &[u8],
    signature: &[u8],
    message: &[u8],
) -> Result<bool, CryptoError> {
    let public = RistrettoPublicKey::from_canonical_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("{e:?}")))?;
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let nonce = RistrettoPublicKey::from_canonical_bytes(&signature[..PUBLIC_KEY_LEN])
        .map_err(|e| CryptoError::InvalidSignature(format!("{e:?}")))?;
    let scalar = RistrettoSecretKey::from_canonical_bytes(&signature[PUBLIC_KEY_LEN..])
        .map_err(|e| CryptoError::InvalidSignature(format!("{e:?}")))?;
    let signature = RistrettoSchnorr::new(nonce, scalar);
    Ok(signature.verify(&public, message))
}
