//! Spend authorization for classified outputs

use crate::crypto::{hashing::key_hash, keys::verify_signature};
use crate::data_structures::transaction::Witness;
use crate::errors::{AuthorizationError, CryptoError};
use crate::validation::script_pattern::ClassifiedScript;

/// Why an input is being unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpendPurpose {
    /// Consuming the output in an ordinary transaction
    #[default]
    Spend,
    /// Using a cold-staked output as a staking input during block creation
    Stake,
}

/// Decide whether `witness` may unlock an output locked by `classified`.
///
/// `message` is the sighash the witness signature must cover. Role checks run
/// before the signature so that a counterparty's attempt reports the
/// template-specific verify failure.
pub fn authorize_spend(
    classified: &ClassifiedScript,
    witness: &Witness,
    message: &[u8],
    purpose: SpendPurpose,
) -> Result<(), AuthorizationError> {
    let signer = key_hash(&witness.public_key);

    match classified {
        ClassifiedScript::Standard(owner) | ClassifiedScript::LeaseReward { owner, .. } => {
            if signer != *owner {
                return Err(AuthorizationError::EqualVerify);
            }
        }
        ClassifiedScript::ColdStake { owner, staker } => {
            if signer == *staker && signer != *owner {
                if purpose != SpendPurpose::Stake {
                    return Err(AuthorizationError::ColdStakeVerify);
                }
            } else if signer != *owner {
                return Err(AuthorizationError::EqualVerify);
            }
        }
        ClassifiedScript::Lease { owner, leaser } => {
            if signer == *leaser && signer != *owner {
                return Err(AuthorizationError::LeaseVerify);
            }
            if signer != *owner {
                return Err(AuthorizationError::EqualVerify);
            }
        }
        ClassifiedScript::Nonstandard(_) => return Err(AuthorizationError::Nonstandard),
    }

    match verify_signature(&witness.public_key, &witness.signature, message) {
        Ok(true) => Ok(()),
        Ok(false) | Err(CryptoError::InvalidSignature(_)) | Err(CryptoError::SigningFailed(_)) => {
            Err(AuthorizationError::CheckSig)
        }
        Err(CryptoError::InvalidPublicKey(_)) => Err(AuthorizationError::PublicKeyEncoding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::data_structures::script::Script;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn witness(pair: &KeyPair, message: &[u8], rng: &mut StdRng) -> Witness {
        Witness {
            public_key: pair.public_key_bytes(),
            signature: pair.sign(message, rng).unwrap(),
        }
    }

    #[test]
    fn test_lease_is_owner_only() {
        let mut rng = StdRng::seed_from_u64(11);
        let owner = KeyPair::random(&mut rng);
        let leaser = KeyPair::random(&mut rng);
        let stranger = KeyPair::random(&mut rng);
        let lease = ClassifiedScript::Lease {
            owner: owner.key_hash(),
            leaser: leaser.key_hash(),
        };
        let msg = b"sighash";

        let w = witness(&owner, msg, &mut rng);
        assert_eq!(authorize_spend(&lease, &w, msg, SpendPurpose::Spend), Ok(()));

        let w = witness(&leaser, msg, &mut rng);
        assert_eq!(
            authorize_spend(&lease, &w, msg, SpendPurpose::Spend),
            Err(AuthorizationError::LeaseVerify)
        );
        assert_eq!(
            authorize_spend(&lease, &w, msg, SpendPurpose::Stake),
            Err(AuthorizationError::LeaseVerify)
        );

        let w = witness(&stranger, msg, &mut rng);
        assert_eq!(
            authorize_spend(&lease, &w, msg, SpendPurpose::Spend),
            Err(AuthorizationError::EqualVerify)
        );
    }

    #[test]
    fn test_cold_stake_staker_may_only_stake() {
        let mut rng = StdRng::seed_from_u64(12);
        let owner = KeyPair::random(&mut rng);
        let staker = KeyPair::random(&mut rng);
        let cold = ClassifiedScript::ColdStake {
            owner: owner.key_hash(),
            staker: staker.key_hash(),
        };
        let msg = b"sighash";

        let w = witness(&staker, msg, &mut rng);
        assert_eq!(
            authorize_spend(&cold, &w, msg, SpendPurpose::Spend),
            Err(AuthorizationError::ColdStakeVerify)
        );
        assert_eq!(authorize_spend(&cold, &w, msg, SpendPurpose::Stake), Ok(()));

        let w = witness(&owner, msg, &mut rng);
        assert_eq!(authorize_spend(&cold, &w, msg, SpendPurpose::Spend), Ok(()));
    }

    #[test]
    fn test_bad_signature_fails_checksig() {
        let mut rng = StdRng::seed_from_u64(13);
        let owner = KeyPair::random(&mut rng);
        let standard = ClassifiedScript::Standard(owner.key_hash());
        let w = witness(&owner, b"other message", &mut rng);
        assert_eq!(
            authorize_spend(&standard, &w, b"sighash", SpendPurpose::Spend),
            Err(AuthorizationError::CheckSig)
        );
    }

    #[test]
    fn test_reward_output_spendable_by_named_payee() {
        let mut rng = StdRng::seed_from_u64(14);
        let owner = KeyPair::random(&mut rng);
        let leaser = KeyPair::random(&mut rng);
        let msg = b"sighash";
        let leasee_reward = ClassifiedScript::LeaseReward {
            owner: owner.key_hash(),
            leaser: leaser.key_hash(),
        };
        let leaser_reward = ClassifiedScript::LeaseReward {
            owner: leaser.key_hash(),
            leaser: leaser.key_hash(),
        };

        let by_owner = witness(&owner, msg, &mut rng);
        let by_leaser = witness(&leaser, msg, &mut rng);
        assert!(authorize_spend(&leasee_reward, &by_owner, msg, SpendPurpose::Spend).is_ok());
        assert!(authorize_spend(&leasee_reward, &by_leaser, msg, SpendPurpose::Spend).is_err());
        assert!(authorize_spend(&leaser_reward, &by_leaser, msg, SpendPurpose::Spend).is_ok());
        assert!(authorize_spend(&leaser_reward, &by_owner, msg, SpendPurpose::Spend).is_err());
    }

    #[test]
    fn test_nonstandard_is_never_authorized() {
        let mut rng = StdRng::seed_from_u64(15);
        let owner = KeyPair::random(&mut rng);
        let w = witness(&owner, b"m", &mut rng);
        let script = ClassifiedScript::Nonstandard(Script::new(vec![0x6a]));
        assert_eq!(
            authorize_spend(&script, &w, b"m", SpendPurpose::Spend),
            Err(AuthorizationError::Nonstandard)
        );
    }
}
