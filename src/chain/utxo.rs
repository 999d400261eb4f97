//! Unspent output set and a copy-on-write overlay used during validation

use std::collections::{BTreeMap, BTreeSet};

use crate::data_structures::transaction::TxOut;
use crate::data_structures::types::{Amount, BlockHeight, OutPoint};
use crate::validation::script_pattern::{classify, ClassifiedScript};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub output: TxOut,
    pub height: BlockHeight,
    pub is_coinbase: bool,
    pub classification: ClassifiedScript,
}

impl UtxoEntry {
    pub fn new(output: TxOut, height: BlockHeight, is_coinbase: bool) -> Self {
        let classification = classify(&output.script);
        Self {
            output,
            height,
            is_coinbase,
            classification,
        }
    }

    pub fn value(&self) -> Amount {
        self.output.value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: BTreeMap<OutPoint, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) -> Option<UtxoEntry> {
        self.entries.insert(outpoint, entry)
    }

    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.entries.remove(outpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_value(&self) -> Amount {
        self.entries.values().map(UtxoEntry::value).sum()
    }
}

/// Pending spends and additions layered over a [`UtxoSet`]
#[derive(Debug)]
pub struct UtxoView<'a> {
    base: &'a UtxoSet,
    added: BTreeMap<OutPoint, UtxoEntry>,
    spent: BTreeSet<OutPoint>,
}

impl<'a> UtxoView<'a> {
    pub fn new(base: &'a UtxoSet) -> Self {
        Self {
            base,
            added: BTreeMap::new(),
            spent: BTreeSet::new(),
        }
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        if self.spent.contains(outpoint) {
            return None;
        }
        self.added
            .get(outpoint)
            .or_else(|| self.base.get(outpoint))
    }

    /// Mark spent; false when the output is not available
    pub fn spend(&mut self, outpoint: &OutPoint) -> bool {
        if self.get(outpoint).is_none() {
            return false;
        }
        if self.added.remove(outpoint).is_none() {
            self.spent.insert(*outpoint);
        }
        true
    }

    pub fn add(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.added.insert(outpoint, entry);
    }
}
