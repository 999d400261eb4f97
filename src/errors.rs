//! Error types for the leasing consensus libraries
//!
//! Component errors are small enums local to the concern that raises them and
//! convert into [`LeasingError`], which carries the validation taxonomy seen by
//! callers of the chain and wallet operations.

use thiserror::Error;

use crate::data_structures::types::{Amount, BlockHeight, OutPoint, TxId};
use crate::sporks::SporkId;

/// Result alias used throughout the crate
pub type LeasingResult<T> = Result<T, LeasingError>;

/// Top-level error for chain validation and wallet operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeasingError {
    /// A cold-staking or leasing output was used while its spork is inactive
    #[error("The transaction was rejected! {feature} is not active")]
    PolicyDisabled { feature: SporkId },

    /// The owner address of a lease or delegation is not held by this wallet
    #[error(
        "The provided owneraddress \"{address}\" is not present in this wallet. \
         WARNING: Only the owner of the key to owneraddress will be allowed to spend these coins"
    )]
    OwnershipWarning { address: String },

    /// Requested amount is under the configured floor
    #[error("Invalid amount ({amount}). Min amount: {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },

    /// A spend failed the ownership check of the spend authorizer
    #[error("mandatory-script-verify-flag-failed ({reason}) for input {outpoint}")]
    UnauthorizedSpend { outpoint: OutPoint, reason: String },

    /// A block's leasing reward outputs differ from the scheduler's computation
    #[error("bad-txns-leasing-reward-value at height {height}: {reason}")]
    RewardMismatch { height: BlockHeight, reason: String },

    #[error("Invalid block at height {height}: {reason}")]
    InvalidBlock { height: BlockHeight, reason: String },

    #[error("Invalid transaction {txid}: {reason}")]
    InvalidTransaction { txid: TxId, reason: String },

    #[error("Missing input {0}")]
    MissingInput(OutPoint),

    #[error("Input {0} is already spent")]
    DoubleSpend(OutPoint),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Amount, available: Amount },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Spork(#[from] SporkError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LeasingError {
    pub fn invalid_block(height: BlockHeight, reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            height,
            reason: reason.into(),
        }
    }

    pub fn invalid_transaction(txid: TxId, reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            txid,
            reason: reason.into(),
        }
    }

    pub fn reward_mismatch(height: BlockHeight, reason: impl Into<String>) -> Self {
        Self::RewardMismatch {
            height,
            reason: reason.into(),
        }
    }

    /// True for failures that reject a block or transaction by consensus
    pub fn is_consensus_rejection(&self) -> bool {
        matches!(
            self,
            LeasingError::PolicyDisabled { .. }
                | LeasingError::UnauthorizedSpend { .. }
                | LeasingError::RewardMismatch { .. }
                | LeasingError::InvalidBlock { .. }
                | LeasingError::InvalidTransaction { .. }
                | LeasingError::MissingInput(_)
                | LeasingError::DoubleSpend(_)
        )
    }
}

/// Script-interpreter failures raised by the spend authorizer
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Script failed an OP_CHECKCOLDSTAKEVERIFY operation")]
    ColdStakeVerify,
    #[error("Script failed an OP_CHECKLEASEVERIFY operation")]
    LeaseVerify,
    #[error("Script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("Script failed an OP_CHECKSIG operation")]
    CheckSig,
    #[error("Public key is not a valid encoding")]
    PublicKeyEncoding,
    #[error("Script is not spendable by a key signature")]
    Nonstandard,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base58 address encoding: {0}")]
    InvalidEncoding(String),
    #[error("Invalid address length: {0}")]
    InvalidLength(usize),
    #[error("Unknown address version byte: {0}")]
    UnknownVersion(u8),
    #[error("Invalid {expected} address: {address}")]
    WrongKind { expected: String, address: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),
    #[error("Amount has more than 8 decimal places: {0}")]
    TooPrecise(String),
    #[error("Amount out of range")]
    Overflow,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Output {0} is already tracked")]
    DuplicateOutput(OutPoint),
    #[error("Output {0} is not tracked")]
    UnknownOutput(OutPoint),
    #[error("Output {0} is not a lease")]
    NotALease(OutPoint),
    #[error("Lease {outpoint} is not mature at height {height}")]
    NotMature { outpoint: OutPoint, height: BlockHeight },
    #[error("Journal is inconsistent at height {height}: {reason}")]
    InconsistentJournal { height: BlockHeight, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SporkError {
    #[error("Invalid signature on {0} message")]
    InvalidSignature(SporkId),
    #[error("Stale {id} message signed at {time_signed}, last applied {last_applied}")]
    StaleMessage {
        id: SporkId,
        time_signed: u64,
        last_applied: u64,
    },
    #[error("Unknown spork: {0}")]
    UnknownSpork(String),
    #[error("Spork key is not configured")]
    MissingKey,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Failed to read parameters: {0}")]
    Io(String),
    #[error("Failed to parse parameters: {0}")]
    Parse(String),
    #[error("Invalid parameter {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

#[cfg(feature = "storage")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_spend_message_matches_interpreter_wording() {
        let err = LeasingError::UnauthorizedSpend {
            outpoint: OutPoint::new(TxId([1u8; 32]), 0),
            reason: AuthorizationError::LeaseVerify.to_string(),
        };
        assert!(err
            .to_string()
            .contains("mandatory-script-verify-flag-failed (Script failed an OP_CHECKLEASEVERIFY operation"));
        assert!(err.is_consensus_rejection());
    }

    #[test]
    fn test_wallet_side_errors_are_not_consensus_rejections() {
        let err = LeasingError::BelowMinimum {
            amount: Amount(99_000_000),
            minimum: Amount(100_000_000),
        };
        assert!(!err.is_consensus_rejection());
        assert_eq!(err.to_string(), "Invalid amount (0.99000000). Min amount: 1.00000000");
    }
}
