//! Accepted, unconfirmed transactions in arrival order

use std::collections::{BTreeMap, HashMap};

use crate::data_structures::transaction::Transaction;
use crate::data_structures::types::{OutPoint, TxId};

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    order: Vec<TxId>,
    txs: HashMap<TxId, Transaction>,
    spent_by: BTreeMap<OutPoint, TxId>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.txs.contains_key(txid)
    }

    pub fn get(&self, txid: &TxId) -> Option<&Transaction> {
        self.txs.get(txid)
    }

    /// Transaction spending `outpoint`, if any
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<TxId> {
        self.spent_by.get(outpoint).copied()
    }

    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.spent_by.contains_key(outpoint)
    }

    /// Transactions in arrival order
    pub fn transactions(&self) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|txid| self.txs.get(txid))
            .cloned()
            .collect()
    }

    /// Add an already validated transaction
    pub fn insert(&mut self, tx: Transaction) -> TxId {
        let txid = tx.txid();
        if self.txs.contains_key(&txid) {
            return txid;
        }
        for input in &tx.inputs {
            self.spent_by.insert(input.prevout, txid);
        }
        self.order.push(txid);
        self.txs.insert(txid, tx);
        txid
    }

    pub fn remove(&mut self, txid: &TxId) -> Option<Transaction> {
        let tx = self.txs.remove(txid)?;
        self.order.retain(|t| t != txid);
        for input in &tx.inputs {
            if self.spent_by.get(&input.prevout) == Some(txid) {
                self.spent_by.remove(&input.prevout);
            }
        }
        Some(tx)
    }

    /// Drop every transaction that spends one of `outpoints`
    pub fn remove_conflicts<'a>(&mut self, outpoints: impl IntoIterator<Item = &'a OutPoint>) -> Vec<TxId> {
        let mut conflicting: Vec<TxId> = outpoints
            .into_iter()
            .filter_map(|outpoint| self.spender_of(outpoint))
            .collect();
        conflicting.sort();
        conflicting.dedup();
        for txid in &conflicting {
            self.remove(txid);
        }
        conflicting
    }

    /// Remove everything, returning transactions in arrival order
    pub fn drain(&mut self) -> Vec<Transaction> {
        let txs = self.transactions();
        self.order.clear();
        self.txs.clear();
        self.spent_by.clear();
        txs
    }
}
