//! In-memory chain: UTXO set, mempool, block connection and reorganization
//!
//! The chain owns the lease registry and drives it from connected blocks.
//! Wallets read it through [`ChainState`] accessors and submit signed
//! transactions with [`ChainState::accept_to_mempool`].

pub mod builder;
pub mod chain_state;
pub mod mempool;
pub mod service_nodes;
pub mod utxo;

pub use builder::{ChainBuildError, ChainBuilder};
pub use chain_state::{BlockUndo, ChainState};
pub use mempool::Mempool;
pub use service_nodes::{ServiceNodeChange, ServiceNodeSet};
pub use utxo::{UtxoEntry, UtxoSet, UtxoView};
