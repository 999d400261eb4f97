//! Transactions, blocks and the leasing reward transaction
//!
//! Consensus identifiers are Blake2b digests over the borsh encoding.
//! Witnesses are excluded from the txid so that signing commits to a stable
//! identifier.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::crypto::hashing::{domain_hash, BLOCK_HASH_DOMAIN, SIGHASH_DOMAIN, TXID_DOMAIN};
use crate::data_structures::script::Script;
use crate::data_structures::types::{Amount, BlockHash, BlockHeight, KeyHash, OutPoint, TxId};

/// A transaction output: value locked by a script
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct TxOut {
    pub value: Amount,
    pub script: Script,
}

impl TxOut {
    pub fn new(value: Amount, script: Script) -> Self {
        Self { value, script }
    }
}

/// Public key and signature unlocking an input
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Witness {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub witness: Witness,
}

impl TxIn {
    pub fn unsigned(prevout: OutPoint) -> Self {
        Self {
            prevout,
            witness: Witness::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub version: u16,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u64,
}

impl Transaction {
    pub const CURRENT_VERSION: u16 = 1;

    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Coinbase paying `value` to `script`; the height keeps coinbase txids unique
    pub fn coinbase(height: BlockHeight, value: Amount, script: Script) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            inputs: Vec::new(),
            outputs: vec![TxOut::new(value, script)],
            lock_time: height,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn txid(&self) -> TxId {
        let prevouts: Vec<OutPoint> = self.inputs.iter().map(|i| i.prevout).collect();
        TxId(domain_hash(
            TXID_DOMAIN,
            &(self.version, prevouts, self.outputs.clone(), self.lock_time),
        ))
    }

    /// Message signed by the witness of input `index`
    pub fn sighash(&self, index: usize) -> [u8; 32] {
        domain_hash(SIGHASH_DOMAIN, &(self.txid(), index as u32))
    }

    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn outpoint(&self, vout: u32) -> OutPoint {
        OutPoint::new(self.txid(), vout)
    }
}

/// Kind of participant fulfilling the leaser role for a block
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub enum LeaserRole {
    /// An ordinary cold-staking or leasing participant
    Ordinary,
    /// A registered service node, paid separately for the same block
    ServiceNode,
}

/// What a reward entry pays for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum RewardSource {
    /// Leasee payout for the lease output being rewarded
    Lease(OutPoint),
    /// The leaser's per-block payout
    Leaser(LeaserRole),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RewardEntry {
    pub source: RewardSource,
    pub output: TxOut,
}

/// Newly minted leasing rewards of one block, output `i` paying entry `i`
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct RewardTransaction {
    pub height: BlockHeight,
    pub entries: Vec<RewardEntry>,
}

impl RewardTransaction {
    pub fn new(height: BlockHeight, entries: Vec<RewardEntry>) -> Self {
        Self { height, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn txid(&self) -> TxId {
        TxId(domain_hash(TXID_DOMAIN, self))
    }

    pub fn total(&self) -> Amount {
        self.entries.iter().map(|e| e.output.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub height: BlockHeight,
    pub prev_hash: BlockHash,
    /// Key hash paid by the coinbase
    pub producer: KeyHash,
    /// Leaser whose mature leases are rewarded in this block, if any
    pub leaser: Option<KeyHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub coinbase: Transaction,
    pub transactions: Vec<Transaction>,
    pub rewards: RewardTransaction,
}

impl Block {
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    pub fn hash(&self) -> BlockHash {
        let txids: Vec<TxId> = self.transactions.iter().map(Transaction::txid).collect();
        BlockHash(domain_hash(
            BLOCK_HASH_DOMAIN,
            &(
                self.header.clone(),
                self.coinbase.txid(),
                txids,
                self.rewards.txid(),
            ),
        ))
    }
}
