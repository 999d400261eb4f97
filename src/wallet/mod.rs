//! Wallet operations for cold staking and leasing
//!
//! A [`Wallet`] holds keys and builds signed transactions against a
//! [`ChainState`]. The operations mirror the node's RPC surface:
//! `delegate_stake`, `lease_to_address`, `list_leasing_utxos`,
//! `get_wallet_info`, `spend_outputs` and `lock_unspent`.
//!
//! Checks in `delegate_stake` and `lease_to_address` run in a fixed order:
//! feature flag, counterparty address kind, minimum amount, available funds,
//! owner address. The first failing check decides the error.

pub mod balance;
pub mod keystore;
pub mod output_status;

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
#[cfg(feature = "tracing")]
use tracing::{debug, info};

pub use balance::{aggregate_balances, KeyOwnership, WalletBalanceSnapshot};
pub use keystore::KeyStore;
pub use output_status::OutputStatus;

use crate::chain::{ChainState, UtxoEntry};
use crate::crypto::KeyPair;
use crate::data_structures::address::{Address, AddressKind};
use crate::data_structures::transaction::{Transaction, TxIn, TxOut, Witness};
use crate::data_structures::types::{Amount, BlockHeight, KeyHash, OutPoint, TxId};
use crate::errors::{AddressError, LeasingError, LeasingResult};
use crate::sporks::SporkId;
use crate::validation::script_pattern::{classify, ClassifiedScript, ScriptPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationOptions {
    /// Allow an owner address whose key this wallet does not hold
    pub force_external_owner: bool,
    /// Fund the delegation from coins already delegated by this wallet
    pub use_delegated: bool,
    /// Build the transaction even while cold staking is not enforced
    pub force_not_enabled: bool,
    /// Submit to the mempool; otherwise only return the signed transaction
    pub broadcast: bool,
}

impl Default for DelegationOptions {
    fn default() -> Self {
        Self {
            force_external_owner: false,
            use_delegated: false,
            force_not_enabled: false,
            broadcast: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseOptions {
    pub force_external_owner: bool,
    pub force_not_enabled: bool,
    pub broadcast: bool,
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            force_external_owner: false,
            force_not_enabled: false,
            broadcast: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationResult {
    pub txid: TxId,
    pub owner_address: String,
    pub staker_address: String,
    #[serde(skip)]
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseResult {
    pub txid: TxId,
    pub owner_address: String,
    pub leaser_address: String,
    #[serde(skip)]
    pub transaction: Transaction,
}

/// An unspent output involving one of the wallet's keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletOutput {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub pattern: ScriptPattern,
    pub classification: ClassifiedScript,
    pub height: BlockHeight,
    pub confirmations: u64,
    pub status: OutputStatus,
}

/// Entry of [`Wallet::list_leasing_utxos`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeasingUtxo {
    pub txid: TxId,
    pub vout: u32,
    pub amount: Amount,
    pub confirmations: u64,
    pub leaser_address: String,
    pub owner_address: String,
    /// Owner is in this wallet's leasee list
    pub whitelisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletInfo {
    /// Spendable confirmed value
    pub balance: Amount,
    /// Value paid to this wallet by mempool transactions
    pub unconfirmed_balance: Amount,
    pub locked_balance: Amount,
    #[serde(flatten)]
    pub balances: WalletBalanceSnapshot,
    pub key_count: usize,
}

pub struct Wallet {
    keys: KeyStore,
    rng: StdRng,
    locked: BTreeSet<OutPoint>,
    leasees: BTreeSet<KeyHash>,
}

impl Wallet {
    /// Wallet with a deterministic key stream
    pub fn from_seed(seed: u64) -> Self {
        Self {
            keys: KeyStore::new(),
            rng: StdRng::seed_from_u64(seed),
            locked: BTreeSet::new(),
            leasees: BTreeSet::new(),
        }
    }

    pub fn random() -> Self {
        Self {
            keys: KeyStore::new(),
            rng: StdRng::from_entropy(),
            locked: BTreeSet::new(),
            leasees: BTreeSet::new(),
        }
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn import_key(&mut self, key: KeyPair) -> KeyHash {
        self.keys.insert(key)
    }

    pub fn owns(&self, key_hash: &KeyHash) -> bool {
        self.keys.contains(key_hash)
    }

    /// Generate a key and return its address of the requested kind
    pub fn new_address(&mut self, kind: AddressKind) -> Address {
        let hash = self.keys.generate(&mut self.rng);
        Address::new(kind, hash)
    }

    pub fn get_new_address(&mut self) -> Address {
        self.new_address(AddressKind::Standard)
    }

    pub fn get_new_staking_address(&mut self) -> Address {
        self.new_address(AddressKind::Staking)
    }

    pub fn get_new_leasing_address(&mut self) -> Address {
        self.new_address(AddressKind::Leasing)
    }

    /// Mark an owner as whitelisted leasee
    pub fn add_leasee(&mut self, address: &str) -> LeasingResult<()> {
        let address = Address::parse_kind(address, AddressKind::Standard)?;
        self.leasees.insert(address.hash);
        Ok(())
    }

    pub fn remove_leasee(&mut self, address: &str) -> LeasingResult<bool> {
        let address = Address::parse_kind(address, AddressKind::Standard)?;
        Ok(self.leasees.remove(&address.hash))
    }

    pub fn list_leasees(&self) -> Vec<String> {
        self.leasees
            .iter()
            .map(|hash| Address::standard(*hash).to_base58())
            .collect()
    }

    fn status_of(&self, node: &ChainState, outpoint: &OutPoint) -> OutputStatus {
        if self.locked.contains(outpoint) {
            OutputStatus::Locked
        } else if node.mempool().is_spent(outpoint) {
            OutputStatus::PendingSpend
        } else {
            OutputStatus::Unspent
        }
    }

    fn confirmations(node: &ChainState, height: BlockHeight) -> u64 {
        (node.height() + 1).saturating_sub(height)
    }

    fn to_wallet_output(&self, node: &ChainState, outpoint: OutPoint, entry: &UtxoEntry) -> WalletOutput {
        WalletOutput {
            outpoint,
            value: entry.value(),
            pattern: entry.classification.pattern(),
            classification: entry.classification.clone(),
            height: entry.height,
            confirmations: Self::confirmations(node, entry.height),
            status: self.status_of(node, &outpoint),
        }
    }

    /// Every unspent output naming one of the wallet's keys in any role
    pub fn list_unspent(&self, node: &ChainState) -> Vec<WalletOutput> {
        node.utxos()
            .iter()
            .filter(|(_, entry)| {
                self.keys
                    .key_hashes()
                    .iter()
                    .any(|hash| entry.classification.involves(hash))
            })
            .map(|(outpoint, entry)| self.to_wallet_output(node, *outpoint, entry))
            .collect()
    }

    /// Unspent lease outputs where this wallet is the owner or the leaser
    pub fn list_leasing_utxos(&self, node: &ChainState, exclude_whitelisted: bool) -> Vec<LeasingUtxo> {
        node.utxos()
            .iter()
            .filter_map(|(outpoint, entry)| match entry.classification {
                ClassifiedScript::Lease { owner, leaser }
                    if self.owns(&owner) || self.owns(&leaser) =>
                {
                    Some((outpoint, entry, owner, leaser))
                }
                _ => None,
            })
            .map(|(outpoint, entry, owner, leaser)| LeasingUtxo {
                txid: outpoint.txid,
                vout: outpoint.vout,
                amount: entry.value(),
                confirmations: Self::confirmations(node, entry.height),
                leaser_address: Address::leasing(leaser).to_base58(),
                owner_address: Address::standard(owner).to_base58(),
                whitelisted: self.leasees.contains(&owner),
            })
            .filter(|utxo| !(exclude_whitelisted && utxo.whitelisted))
            .collect()
    }

    /// Outputs coin selection may use, oldest first
    fn spendable_outputs(&self, node: &ChainState, include_delegated: bool) -> Vec<(OutPoint, UtxoEntry)> {
        let mut outputs: Vec<(OutPoint, UtxoEntry)> = node
            .utxos()
            .iter()
            .filter(|(_, entry)| match entry.classification {
                ClassifiedScript::Standard(owner) | ClassifiedScript::LeaseReward { owner, .. } => {
                    self.owns(&owner)
                }
                ClassifiedScript::ColdStake { owner, .. } => include_delegated && self.owns(&owner),
                ClassifiedScript::Lease { .. } | ClassifiedScript::Nonstandard(_) => false,
            })
            .filter(|(outpoint, _)| self.status_of(node, outpoint).is_selectable())
            .map(|(outpoint, entry)| (*outpoint, entry.clone()))
            .collect();
        outputs.sort_by_key(|(outpoint, entry)| (entry.height, *outpoint));
        outputs
    }

    fn spendable_balance(&self, node: &ChainState, include_delegated: bool) -> Amount {
        self.spendable_outputs(node, include_delegated)
            .iter()
            .map(|(_, entry)| entry.value())
            .sum()
    }

    pub fn get_balance(&self, node: &ChainState) -> Amount {
        self.spendable_balance(node, false)
    }

    pub fn get_wallet_info(&self, node: &ChainState) -> WalletInfo {
        let unconfirmed_balance = node
            .mempool()
            .transactions()
            .iter()
            .flat_map(|tx| tx.outputs.iter())
            .filter(|output| {
                matches!(classify(&output.script), ClassifiedScript::Standard(owner) if self.owns(&owner))
            })
            .map(|output| output.value)
            .sum();
        let locked_balance = self
            .locked
            .iter()
            .filter_map(|outpoint| node.utxos().get(outpoint))
            .map(UtxoEntry::value)
            .sum();

        WalletInfo {
            balance: self.get_balance(node),
            unconfirmed_balance,
            locked_balance,
            balances: aggregate_balances(node.registry(), &self.keys),
            key_count: self.keys.len(),
        }
    }

    /// Lock (`unlock == false`) or unlock outputs for coin selection.
    /// Unlocking with an empty list releases every lock.
    pub fn lock_unspent(&mut self, unlock: bool, outpoints: &[OutPoint]) -> bool {
        if unlock && outpoints.is_empty() {
            self.locked.clear();
            return true;
        }
        for outpoint in outpoints {
            if unlock {
                self.locked.remove(outpoint);
            } else {
                self.locked.insert(*outpoint);
            }
        }
        true
    }

    pub fn list_lock_unspent(&self) -> Vec<OutPoint> {
        self.locked.iter().copied().collect()
    }

    /// Key the wallet signs an input with: the authorized spender if held,
    /// else the counterparty so the chain reports the authorization failure
    fn signing_key(&self, classification: &ClassifiedScript, outpoint: &OutPoint) -> LeasingResult<&KeyPair> {
        classification
            .owner()
            .and_then(|owner| self.keys.get(&owner))
            .or_else(|| {
                classification
                    .counterparty()
                    .and_then(|counterparty| self.keys.get(&counterparty))
            })
            .ok_or_else(|| LeasingError::Wallet(format!("no key for output {outpoint}")))
    }

    fn sign(&mut self, tx: &mut Transaction, entries: &[UtxoEntry]) -> LeasingResult<()> {
        let mut witnesses: Vec<Witness> = Vec::with_capacity(tx.inputs.len());
        for (index, (input, entry)) in tx.inputs.iter().zip(entries).enumerate() {
            let key = self.signing_key(&entry.classification, &input.prevout)?.clone();
            witnesses.push(key.sign_input(tx, index, &mut self.rng)?);
        }
        for (input, witness) in tx.inputs.iter_mut().zip(witnesses) {
            input.witness = witness;
        }
        Ok(())
    }

    /// Fund `outputs` with oldest-first coin selection, add change, and sign
    fn create_transaction(
        &mut self,
        node: &ChainState,
        outputs: Vec<TxOut>,
        include_delegated: bool,
    ) -> LeasingResult<Transaction> {
        let fee = node.params().default_fee;
        let requested = outputs
            .iter()
            .try_fold(fee, |acc, output| acc.checked_add(output.value))
            .ok_or_else(|| LeasingError::Wallet("output value overflow".to_string()))?;

        let candidates = self.spendable_outputs(node, include_delegated);
        let available: Amount = candidates.iter().map(|(_, entry)| entry.value()).sum();
        let mut selected = Vec::new();
        let mut total = Amount::ZERO;
        for (outpoint, entry) in candidates {
            if total >= requested {
                break;
            }
            total += entry.value();
            selected.push((outpoint, entry));
        }
        if total < requested {
            return Err(LeasingError::InsufficientFunds {
                requested,
                available,
            });
        }

        let mut outputs = outputs;
        let change = total.saturating_sub(requested);
        if !change.is_zero() {
            let change_address = self.get_new_address();
            outputs.push(TxOut::new(
                change,
                ClassifiedScript::Standard(change_address.hash).to_script(),
            ));
        }

        let inputs = selected
            .iter()
            .map(|(outpoint, _)| TxIn::unsigned(*outpoint))
            .collect();
        let entries: Vec<UtxoEntry> = selected.into_iter().map(|(_, entry)| entry).collect();
        let mut tx = Transaction::new(inputs, outputs);
        self.sign(&mut tx, &entries)?;

        #[cfg(feature = "tracing")]
        debug!(
            txid = %tx.txid(),
            inputs = tx.inputs.len(),
            fee = %fee,
            "Created wallet transaction"
        );
        Ok(tx)
    }

    fn resolve_owner(
        &mut self,
        owner_address: Option<&str>,
        rejected_kind: AddressKind,
        force_external_owner: bool,
    ) -> LeasingResult<Address> {
        match owner_address.filter(|s| !s.is_empty()) {
            Some(s) => {
                let address = Address::from_base58(s)?;
                if address.kind == rejected_kind {
                    return Err(AddressError::WrongKind {
                        expected: AddressKind::Standard.to_string(),
                        address: s.to_string(),
                    }
                    .into());
                }
                if !force_external_owner && !self.owns(&address.hash) {
                    return Err(LeasingError::OwnershipWarning {
                        address: s.to_string(),
                    });
                }
                Ok(Address::standard(address.hash))
            }
            None => Ok(self.get_new_address()),
        }
    }

    fn submit(node: &mut ChainState, tx: &Transaction, broadcast: bool) -> LeasingResult<TxId> {
        if broadcast {
            node.accept_to_mempool(tx.clone())
        } else {
            Ok(tx.txid())
        }
    }

    /// Delegate staking rights over `amount` to `staker_address`
    pub fn delegate_stake(
        &mut self,
        node: &mut ChainState,
        staker_address: &str,
        amount: Amount,
        owner_address: Option<&str>,
        options: DelegationOptions,
    ) -> LeasingResult<DelegationResult> {
        if !node.sporks().is_active(SporkId::ColdStakingEnforcement) && !options.force_not_enabled {
            return Err(LeasingError::PolicyDisabled {
                feature: SporkId::ColdStakingEnforcement,
            });
        }
        let staker = Address::parse_kind(staker_address, AddressKind::Staking)?;

        let minimum = node.params().min_delegation_amount;
        if amount < minimum {
            return Err(LeasingError::BelowMinimum { amount, minimum });
        }
        let available = self.spendable_balance(node, options.use_delegated);
        if amount > available {
            return Err(LeasingError::InsufficientFunds {
                requested: amount,
                available,
            });
        }

        let owner = self.resolve_owner(owner_address, AddressKind::Staking, options.force_external_owner)?;
        let script = ClassifiedScript::ColdStake {
            owner: owner.hash,
            staker: staker.hash,
        }
        .to_script();
        let tx = self.create_transaction(node, vec![TxOut::new(amount, script)], options.use_delegated)?;
        let txid = Self::submit(node, &tx, options.broadcast)?;

        #[cfg(feature = "tracing")]
        info!(txid = %txid, amount = %amount, staker = %staker, "Delegated stake");

        Ok(DelegationResult {
            txid,
            owner_address: owner.to_base58(),
            staker_address: staker.to_base58(),
            transaction: tx,
        })
    }

    /// Lease `amount` to `leaser_address`
    pub fn lease_to_address(
        &mut self,
        node: &mut ChainState,
        leaser_address: &str,
        amount: Amount,
        owner_address: Option<&str>,
        options: LeaseOptions,
    ) -> LeasingResult<LeaseResult> {
        if !node.sporks().is_active(SporkId::LeasingEnforcement) && !options.force_not_enabled {
            return Err(LeasingError::PolicyDisabled {
                feature: SporkId::LeasingEnforcement,
            });
        }
        let leaser = Address::parse_kind(leaser_address, AddressKind::Leasing)?;

        let minimum = node.params().min_leasing_amount;
        if amount < minimum {
            return Err(LeasingError::BelowMinimum { amount, minimum });
        }
        let available = self.get_balance(node);
        if amount > available {
            return Err(LeasingError::InsufficientFunds {
                requested: amount,
                available,
            });
        }

        let owner = self.resolve_owner(owner_address, AddressKind::Leasing, options.force_external_owner)?;
        let script = ClassifiedScript::Lease {
            owner: owner.hash,
            leaser: leaser.hash,
        }
        .to_script();
        let tx = self.create_transaction(node, vec![TxOut::new(amount, script)], false)?;
        let txid = Self::submit(node, &tx, options.broadcast)?;

        #[cfg(feature = "tracing")]
        info!(txid = %txid, amount = %amount, leaser = %leaser, "Leased to address");

        Ok(LeaseResult {
            txid,
            owner_address: owner.to_base58(),
            leaser_address: leaser.to_base58(),
            transaction: tx,
        })
    }

    /// Spend exactly `outpoints` to `destination` (a fresh address when
    /// `None`), paying the default fee. Any output naming a wallet key may be
    /// chosen, so this is also how an unauthorized spend gets attempted.
    pub fn spend_outputs(
        &mut self,
        node: &mut ChainState,
        outpoints: &[OutPoint],
        destination: Option<&str>,
    ) -> LeasingResult<TxId> {
        if outpoints.is_empty() {
            return Err(LeasingError::Wallet("no outputs to spend".to_string()));
        }
        let mut entries = Vec::with_capacity(outpoints.len());
        for outpoint in outpoints {
            let entry = node
                .utxos()
                .get(outpoint)
                .cloned()
                .ok_or(LeasingError::MissingInput(*outpoint))?;
            entries.push(entry);
        }
        let total: Amount = entries.iter().map(UtxoEntry::value).sum();
        let fee = node.params().default_fee;
        let value = total
            .checked_sub(fee)
            .filter(|value| !value.is_zero())
            .ok_or(LeasingError::InsufficientFunds {
                requested: fee,
                available: total,
            })?;

        let destination = match destination {
            Some(s) => Address::parse_kind(s, AddressKind::Standard)?,
            None => self.get_new_address(),
        };
        let inputs = outpoints.iter().map(|outpoint| TxIn::unsigned(*outpoint)).collect();
        let outputs = vec![TxOut::new(
            value,
            ClassifiedScript::Standard(destination.hash).to_script(),
        )];
        let mut tx = Transaction::new(inputs, outputs);
        self.sign(&mut tx, &entries)?;
        node.accept_to_mempool(tx)
    }

    /// Sign a staking kernel with the staker key of `outpoint` and check it against the chain
    pub fn stake_witness(
        &mut self,
        node: &ChainState,
        outpoint: &OutPoint,
        message: &[u8],
    ) -> LeasingResult<Witness> {
        let entry = node
            .utxos()
            .get(outpoint)
            .ok_or(LeasingError::MissingInput(*outpoint))?;
        let staker = match entry.classification {
            ClassifiedScript::ColdStake { staker, .. } => staker,
            ClassifiedScript::Standard(owner) => owner,
            _ => {
                return Err(LeasingError::Wallet(format!(
                    "output {outpoint} cannot be staked"
                )))
            }
        };
        let key = self
            .keys
            .get(&staker)
            .cloned()
            .ok_or_else(|| LeasingError::Wallet(format!("no staking key for output {outpoint}")))?;
        let witness = Witness {
            public_key: key.public_key_bytes(),
            signature: key.sign(message, &mut self.rng)?,
        };
        node.check_stake_input(outpoint, &witness, message)?;
        Ok(witness)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("keys", &self.keys.len())
            .field("locked", &self.locked.len())
            .finish_non_exhaustive()
    }
}
