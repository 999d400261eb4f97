//! Core value types: amounts, identifiers, scripts, transactions and addresses

pub mod address;
pub mod script;
pub mod transaction;
pub mod types;

pub use address::{Address, AddressKind};
pub use script::Script;
pub use transaction::{
    Block, BlockHeader, LeaserRole, RewardEntry, RewardSource, RewardTransaction, Transaction,
    TxIn, TxOut, Witness,
};
pub use types::{Amount, BlockHash, BlockHeight, KeyHash, OutPoint, TxId, COIN};
