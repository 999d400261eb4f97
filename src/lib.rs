//! Cold staking and Proof-of-Lease libraries
//!
//! This crate implements the consensus engine behind cold staking and
//! leasing: classifying delegation scripts, tracking lease maturity,
//! scheduling leasing rewards, authorizing spends and aggregating wallet
//! balances. A small in-memory chain drives the engine the way a node would.
//!
//! ## Features
//!
//! - `tracing` (default): structured logging through `tracing`
//! - `storage`: SQLite persistence of the lease registry
//! - `cli`: the `p2l_sim` scenario binary
//!
//! ```rust
//! use p2l_leasing_libs::chain::ChainBuilder;
//! use p2l_leasing_libs::wallet::Wallet;
//!
//! let mut chain = ChainBuilder::new().build().unwrap();
//! let mut wallet = Wallet::from_seed(1);
//! let address = wallet.get_new_address();
//! chain.generate_block(address.hash, false).unwrap();
//! assert_eq!(wallet.get_balance(&chain).to_string(), "250.00000000");
//! ```

pub mod chain;
pub mod crypto;
pub mod data_structures;
pub mod errors;
pub mod events;
pub mod params;
pub mod registry;
pub mod rewards;
pub mod sporks;
#[cfg(feature = "storage")]
pub mod storage;
pub mod validation;
pub mod wallet;

pub use chain::{ChainBuilder, ChainState};
pub use data_structures::{Address, AddressKind, Amount, KeyHash, OutPoint, Script, TxId};
pub use errors::*;
pub use params::ConsensusParams;
pub use registry::{LeaseRecord, LeaseRegistry, LeaseState};
pub use rewards::{RewardEvent, RewardScheduler};
pub use sporks::{SporkId, SporkManager, SporkMessage, SporkSnapshot};
#[cfg(feature = "storage")]
pub use storage::SqliteLeaseStore;
pub use validation::{authorize_spend, classify, ClassifiedScript, ScriptPattern, SpendPurpose};
pub use wallet::{Wallet, WalletBalanceSnapshot};
