//! Block connection, validation and reorganization
//!
//! [`ChainState`] is the single writer of the UTXO set and the lease
//! registry. A block is validated against one spork snapshot and the registry
//! state of its parent, then applied in a fixed order: reward grants, reward
//! outputs, coinbase, transactions, maturity advance. Every application
//! records undo data so disconnecting a block restores the previous state
//! exactly.

use std::collections::{BTreeSet, HashSet};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

use crate::chain::mempool::Mempool;
use crate::chain::service_nodes::ServiceNodeSet;
use crate::chain::utxo::{UtxoEntry, UtxoSet, UtxoView};
use crate::data_structures::transaction::{
    Block, BlockHeader, LeaserRole, RewardSource, RewardTransaction, Transaction, TxOut, Witness,
};
use crate::data_structures::types::{Amount, BlockHash, BlockHeight, KeyHash, OutPoint, TxId};
use crate::errors::{LeasingError, LeasingResult};
use crate::events::{EventDispatcher, EventMetadata, LeasingEvent};
use crate::params::ConsensusParams;
use crate::registry::LeaseRegistry;
use crate::rewards::{RewardEvent, RewardScheduler};
use crate::sporks::{SporkId, SporkManager, SporkMessage, SporkSnapshot};
use crate::validation::script_pattern::{classify, ClassifiedScript};
use crate::validation::spend_authorizer::{authorize_spend, SpendPurpose};

const EVENT_SOURCE: &str = "chain";

/// Data needed to disconnect a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockUndo {
    pub height: BlockHeight,
    /// Outputs consumed by the block, in spend order
    pub spent: Vec<(OutPoint, UtxoEntry)>,
    /// Outputs created by the block
    pub created: Vec<OutPoint>,
}

pub struct ChainState {
    params: ConsensusParams,
    scheduler: RewardScheduler,
    sporks: SporkManager,
    utxos: UtxoSet,
    registry: LeaseRegistry,
    mempool: Mempool,
    blocks: Vec<Block>,
    undo: Vec<BlockUndo>,
    service_nodes: ServiceNodeSet,
    events: EventDispatcher,
}

fn apply_to_view(view: &mut UtxoView<'_>, tx: &Transaction, height: BlockHeight) {
    let txid = tx.txid();
    for input in &tx.inputs {
        view.spend(&input.prevout);
    }
    for (vout, output) in tx.outputs.iter().enumerate() {
        view.add(
            OutPoint::new(txid, vout as u32),
            UtxoEntry::new(output.clone(), height, false),
        );
    }
}

impl ChainState {
    pub(crate) fn new(
        params: ConsensusParams,
        sporks: SporkManager,
        service_nodes: ServiceNodeSet,
        events: EventDispatcher,
    ) -> Self {
        Self {
            scheduler: RewardScheduler::from_params(&params),
            registry: LeaseRegistry::new(params.leasing_maturity),
            params,
            sporks,
            utxos: UtxoSet::new(),
            mempool: Mempool::new(),
            blocks: Vec::new(),
            undo: Vec::new(),
            service_nodes,
            events,
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn registry(&self) -> &LeaseRegistry {
        &self.registry
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn sporks(&self) -> &SporkManager {
        &self.sporks
    }

    pub fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    /// Height of the tip; 0 before the first block
    pub fn height(&self) -> BlockHeight {
        self.blocks.len() as BlockHeight
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.blocks.last().map(Block::hash).unwrap_or_default()
    }

    pub fn block_at(&self, height: BlockHeight) -> Option<&Block> {
        height
            .checked_sub(1)
            .and_then(|index| self.blocks.get(index as usize))
    }

    pub fn apply_spork(&self, message: &SporkMessage) -> LeasingResult<()> {
        self.sporks.apply(message)?;
        Ok(())
    }

    /// Register `key_hash` as a service node from the next block on.
    /// Disconnecting the current tip drops the registration.
    pub fn register_service_node(&mut self, key_hash: KeyHash) {
        self.service_nodes.record(key_hash, true, self.height() + 1);
    }

    /// Remove `key_hash` from the service nodes from the next block on
    pub fn remove_service_node(&mut self, key_hash: &KeyHash) {
        self.service_nodes.record(*key_hash, false, self.height() + 1);
    }

    pub fn service_nodes(&self) -> &ServiceNodeSet {
        &self.service_nodes
    }

    /// Role of `key_hash` for the next block
    pub fn leaser_role(&self, key_hash: &KeyHash) -> LeaserRole {
        self.service_nodes.role_at(key_hash, self.height() + 1)
    }

    /// Value of all active leases naming `leaser`
    pub fn total_leased_to(&self, leaser: &KeyHash) -> Amount {
        self.registry.total_leased_to(leaser)
    }

    /// Consensus checks of a non-coinbase transaction against `view`.
    /// Returns the fee.
    fn check_transaction(
        &self,
        tx: &Transaction,
        view: &UtxoView<'_>,
        sporks: SporkSnapshot,
    ) -> LeasingResult<Amount> {
        let txid = tx.txid();
        if tx.is_coinbase() {
            return Err(LeasingError::invalid_transaction(txid, "transaction has no inputs"));
        }
        if tx.outputs.is_empty() {
            return Err(LeasingError::invalid_transaction(txid, "transaction has no outputs"));
        }

        for output in &tx.outputs {
            let classified = classify(&output.script);
            if let ClassifiedScript::LeaseReward { .. } = classified {
                return Err(LeasingError::invalid_transaction(
                    txid,
                    "leasing reward outputs may only be minted by the block reward transaction",
                ));
            }
            if let Some(feature) = classified.gating_spork() {
                if !sporks.is_active(feature) {
                    return Err(LeasingError::PolicyDisabled { feature });
                }
            }
        }

        let mut seen = BTreeSet::new();
        let mut value_in = Amount::ZERO;
        for (index, input) in tx.inputs.iter().enumerate() {
            if !seen.insert(input.prevout) {
                return Err(LeasingError::DoubleSpend(input.prevout));
            }
            let entry = view
                .get(&input.prevout)
                .ok_or(LeasingError::MissingInput(input.prevout))?;
            authorize_spend(
                &entry.classification,
                &input.witness,
                &tx.sighash(index),
                SpendPurpose::Spend,
            )
            .map_err(|e| LeasingError::UnauthorizedSpend {
                outpoint: input.prevout,
                reason: e.to_string(),
            })?;
            value_in = value_in
                .checked_add(entry.value())
                .ok_or_else(|| LeasingError::invalid_transaction(txid, "input value overflow"))?;
        }

        let value_out = tx
            .outputs
            .iter()
            .try_fold(Amount::ZERO, |acc, o| acc.checked_add(o.value))
            .ok_or_else(|| LeasingError::invalid_transaction(txid, "output value overflow"))?;
        value_in.checked_sub(value_out).ok_or_else(|| {
            LeasingError::invalid_transaction(
                txid,
                format!("value out {value_out} exceeds value in {value_in}"),
            )
        })
    }

    /// Mempool policy: consensus checks under the current spork state plus
    /// conflict detection against other unconfirmed transactions
    pub fn accept_to_mempool(&mut self, tx: Transaction) -> LeasingResult<TxId> {
        let txid = tx.txid();
        if self.mempool.contains(&txid) {
            return Err(LeasingError::invalid_transaction(txid, "already in mempool"));
        }
        for input in &tx.inputs {
            if self.mempool.is_spent(&input.prevout) {
                return Err(LeasingError::DoubleSpend(input.prevout));
            }
        }

        let snapshot = self.sporks.snapshot();
        let view = UtxoView::new(&self.utxos);
        let result = self.check_transaction(&tx, &view, snapshot);
        let _fee = match result {
            Ok(fee) => fee,
            Err(e) => {
                #[cfg(feature = "tracing")]
                warn!(txid = %txid, error = %e, "Transaction rejected");
                return Err(e);
            }
        };

        #[cfg(feature = "tracing")]
        debug!(txid = %txid, fee = %_fee, "Transaction accepted to mempool");
        self.mempool.insert(tx);
        Ok(txid)
    }

    /// Verify that `outpoint` may serve as a staking input for the holder of `witness`
    pub fn check_stake_input(
        &self,
        outpoint: &OutPoint,
        witness: &Witness,
        message: &[u8],
    ) -> LeasingResult<()> {
        let entry = self
            .utxos
            .get(outpoint)
            .ok_or(LeasingError::MissingInput(*outpoint))?;
        match entry.classification {
            ClassifiedScript::ColdStake { .. } => {
                if !self.sporks.is_active(SporkId::ColdStakingEnforcement) {
                    return Err(LeasingError::PolicyDisabled {
                        feature: SporkId::ColdStakingEnforcement,
                    });
                }
            }
            ClassifiedScript::Standard(_) => {}
            _ => {
                return Err(LeasingError::UnauthorizedSpend {
                    outpoint: *outpoint,
                    reason: "output cannot be used as a staking input".to_string(),
                })
            }
        }
        authorize_spend(&entry.classification, witness, message, SpendPurpose::Stake).map_err(
            |e| LeasingError::UnauthorizedSpend {
                outpoint: *outpoint,
                reason: e.to_string(),
            },
        )
    }

    /// Build a block on the tip from the mempool. With `claim_leasing` the
    /// producer claims the leaser role and the block pays its leasing rewards.
    pub fn assemble_block(&self, producer: KeyHash, claim_leasing: bool) -> LeasingResult<Block> {
        let height = self.height() + 1;
        let snapshot = self.sporks.snapshot();

        let mut view = UtxoView::new(&self.utxos);
        let mut fees = Amount::ZERO;
        let mut transactions = Vec::new();
        for tx in self.mempool.transactions() {
            match self.check_transaction(&tx, &view, snapshot) {
                Ok(fee) => {
                    apply_to_view(&mut view, &tx, height);
                    fees += fee;
                    transactions.push(tx);
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    debug!(txid = %tx.txid(), error = %_e, "Skipping mempool transaction");
                }
            }
        }

        let leaser = claim_leasing.then_some(producer);
        let rewards = match leaser {
            Some(leaser) => {
                let events = self.scheduler.compute_rewards(
                    &self.registry,
                    height,
                    &leaser,
                    self.service_nodes.role_at(&leaser, height),
                    snapshot,
                );
                RewardScheduler::build_reward_transaction(height, &events)
            }
            None => RewardTransaction::new(height, Vec::new()),
        };

        let coinbase = Transaction::coinbase(
            height,
            self.params.block_subsidy + fees,
            ClassifiedScript::Standard(producer).to_script(),
        );
        Ok(Block {
            header: BlockHeader {
                height,
                prev_hash: self.tip_hash(),
                producer,
                leaser,
            },
            coinbase,
            transactions,
            rewards,
        })
    }

    /// Assemble and connect a block
    pub fn generate_block(&mut self, producer: KeyHash, claim_leasing: bool) -> LeasingResult<Block> {
        let block = self.assemble_block(producer, claim_leasing)?;
        self.connect_block(block.clone())?;
        Ok(block)
    }

    /// Full validation of `block` as the next block. Returns its reward events.
    pub fn validate_block(&self, block: &Block, sporks: SporkSnapshot) -> LeasingResult<Vec<RewardEvent>> {
        let header = &block.header;
        let height = header.height;
        if height != self.height() + 1 {
            return Err(LeasingError::invalid_block(
                height,
                format!("expected height {}", self.height() + 1),
            ));
        }
        if header.prev_hash != self.tip_hash() {
            return Err(LeasingError::invalid_block(height, "previous hash does not match tip"));
        }
        if let Some(leaser) = header.leaser {
            if leaser != header.producer {
                return Err(LeasingError::invalid_block(
                    height,
                    "leaser claim does not match block producer",
                ));
            }
        }

        let mut view = UtxoView::new(&self.utxos);
        let mut fees = Amount::ZERO;
        let mut txids = HashSet::new();
        for tx in &block.transactions {
            if !txids.insert(tx.txid()) {
                return Err(LeasingError::invalid_block(
                    height,
                    format!("duplicate transaction {}", tx.txid()),
                ));
            }
            fees += self.check_transaction(tx, &view, sporks)?;
            apply_to_view(&mut view, tx, height);
        }

        let coinbase = &block.coinbase;
        let expected_script = ClassifiedScript::Standard(header.producer).to_script();
        if !coinbase.is_coinbase()
            || coinbase.lock_time != height
            || coinbase.outputs.len() != 1
            || coinbase.outputs[0].script != expected_script
        {
            return Err(LeasingError::invalid_block(height, "malformed coinbase"));
        }
        let allowed = self.params.block_subsidy + fees;
        if coinbase.total_output() > allowed {
            return Err(LeasingError::invalid_block(
                height,
                format!("coinbase pays {} above allowed {allowed}", coinbase.total_output()),
            ));
        }

        let role = header
            .leaser
            .map(|leaser| self.service_nodes.role_at(&leaser, height))
            .unwrap_or(LeaserRole::Ordinary);
        self.scheduler.validate_rewards(
            &self.registry,
            height,
            header.leaser.as_ref(),
            role,
            sporks,
            &block.rewards,
        )
    }

    /// `reward_source` is set for outputs of the block's reward transaction
    #[allow(clippy::too_many_arguments)]
    fn add_output(
        &mut self,
        outpoint: OutPoint,
        output: TxOut,
        height: BlockHeight,
        is_coinbase: bool,
        reward_source: Option<&RewardSource>,
        undo: &mut BlockUndo,
        events: &mut Vec<LeasingEvent>,
    ) -> LeasingResult<()> {
        let entry = UtxoEntry::new(output, height, is_coinbase);
        let tracked = match reward_source {
            Some(source) => self.registry.on_reward_confirmed(
                outpoint,
                entry.value(),
                &entry.classification,
                source,
                height,
            )?,
            None => self
                .registry
                .on_confirmed(outpoint, entry.value(), &entry.classification, height)?,
        };
        if tracked {
            if let Some(record) = self.registry.get(&outpoint) {
                events.push(LeasingEvent::LeaseConfirmed {
                    metadata: EventMetadata::new(EVENT_SOURCE, height),
                    outpoint,
                    pattern: record.pattern(),
                    role: record.role,
                    value: record.value,
                    owner: record.owner(),
                    counterparty: record.counterparty(),
                });
            }
        }
        self.utxos.insert(outpoint, entry);
        undo.created.push(outpoint);
        Ok(())
    }

    fn spend_output(
        &mut self,
        outpoint: &OutPoint,
        height: BlockHeight,
        undo: &mut BlockUndo,
        events: &mut Vec<LeasingEvent>,
    ) -> LeasingResult<()> {
        let entry = self
            .utxos
            .remove(outpoint)
            .ok_or(LeasingError::MissingInput(*outpoint))?;
        if let Some(record) = self.registry.on_spent(outpoint, height)? {
            events.push(LeasingEvent::LeaseSpent {
                metadata: EventMetadata::new(EVENT_SOURCE, height),
                outpoint: *outpoint,
                value: record.value,
            });
        }
        undo.spent.push((*outpoint, entry));
        Ok(())
    }

    /// Validate and apply `block` on top of the tip
    pub fn connect_block(&mut self, block: Block) -> LeasingResult<BlockHash> {
        let snapshot = self.sporks.snapshot();
        let rewards = match self.validate_block(&block, snapshot) {
            Ok(rewards) => rewards,
            Err(e) => {
                #[cfg(feature = "tracing")]
                warn!(height = block.height(), error = %e, "Block rejected");
                return Err(e);
            }
        };

        let height = block.height();
        let hash = block.hash();
        let mut undo = BlockUndo {
            height,
            spent: Vec::new(),
            created: Vec::new(),
        };
        let mut events = Vec::new();

        for reward in &rewards {
            if let RewardSource::Lease(outpoint) = reward.source {
                self.registry.record_reward(&outpoint, height)?;
            }
            events.push(LeasingEvent::RewardGranted {
                metadata: EventMetadata::new(EVENT_SOURCE, height),
                reward: reward.clone(),
            });
        }

        let reward_txid = block.rewards.txid();
        for (vout, entry) in block.rewards.entries.iter().enumerate() {
            self.add_output(
                OutPoint::new(reward_txid, vout as u32),
                entry.output.clone(),
                height,
                false,
                Some(&entry.source),
                &mut undo,
                &mut events,
            )?;
        }

        let coinbase_txid = block.coinbase.txid();
        for (vout, output) in block.coinbase.outputs.iter().enumerate() {
            self.add_output(
                OutPoint::new(coinbase_txid, vout as u32),
                output.clone(),
                height,
                true,
                None,
                &mut undo,
                &mut events,
            )?;
        }

        for tx in &block.transactions {
            let txid = tx.txid();
            for input in &tx.inputs {
                self.spend_output(&input.prevout, height, &mut undo, &mut events)?;
            }
            for (vout, output) in tx.outputs.iter().enumerate() {
                self.add_output(
                    OutPoint::new(txid, vout as u32),
                    output.clone(),
                    height,
                    false,
                    None,
                    &mut undo,
                    &mut events,
                )?;
            }
        }

        for outpoint in self.registry.on_height_advance(height)? {
            events.push(LeasingEvent::LeaseMatured {
                metadata: EventMetadata::new(EVENT_SOURCE, height),
                outpoint,
            });
        }

        for tx in &block.transactions {
            self.mempool.remove(&tx.txid());
        }
        self.mempool
            .remove_conflicts(undo.spent.iter().map(|(outpoint, _)| outpoint));

        events.push(LeasingEvent::BlockConnected {
            metadata: EventMetadata::new(EVENT_SOURCE, height),
            hash,
            transactions: block.transactions.len(),
            rewards: block.rewards.entries.len(),
        });

        #[cfg(feature = "tracing")]
        info!(
            height,
            hash = %hash,
            transactions = block.transactions.len(),
            rewards = block.rewards.entries.len(),
            "Connected block"
        );

        self.blocks.push(block);
        self.undo.push(undo);
        self.events.dispatch_all(&events);
        Ok(hash)
    }

    fn disconnect_tip_inner(&mut self) -> LeasingResult<Block> {
        let height = self.height();
        let (Some(block), Some(undo)) = (self.blocks.pop(), self.undo.pop()) else {
            return Err(LeasingError::invalid_block(height, "no block to disconnect"));
        };

        self.registry.rollback_to(undo.height)?;
        self.service_nodes.rollback_to(undo.height);
        for (outpoint, entry) in undo.spent.into_iter().rev() {
            self.utxos.insert(outpoint, entry);
        }
        for outpoint in &undo.created {
            self.utxos.remove(outpoint);
        }

        let pending = self.mempool.drain();
        for tx in block.transactions.iter().cloned().chain(pending) {
            if let Err(_e) = self.accept_to_mempool(tx) {
                #[cfg(feature = "tracing")]
                debug!(error = %_e, "Dropped transaction after disconnect");
            }
        }

        #[cfg(feature = "tracing")]
        info!(height = undo.height, "Disconnected block");
        Ok(block)
    }

    /// Disconnect the tip block, returning its transactions to the mempool
    pub fn disconnect_tip(&mut self) -> LeasingResult<Block> {
        let block = self.disconnect_tip_inner()?;
        let height = block.height();
        self.events.dispatch(&LeasingEvent::Reorg {
            metadata: EventMetadata::new(EVENT_SOURCE, height.saturating_sub(1)),
            fork_height: height,
            disconnected_blocks: 1,
        });
        Ok(block)
    }

    /// Disconnect every block at or above `fork_height`, tip first
    pub fn rollback_to(&mut self, fork_height: BlockHeight) -> LeasingResult<Vec<Block>> {
        if fork_height == 0 {
            return Err(LeasingError::invalid_block(0, "cannot roll back below the first block"));
        }
        if fork_height > self.height() {
            return Ok(Vec::new());
        }
        let mut disconnected = Vec::new();
        while self.height() >= fork_height {
            disconnected.push(self.disconnect_tip_inner()?);
        }
        self.events.dispatch(&LeasingEvent::Reorg {
            metadata: EventMetadata::new(EVENT_SOURCE, self.height()),
            fork_height,
            disconnected_blocks: disconnected.len(),
        });
        Ok(disconnected)
    }
}

impl std::fmt::Debug for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainState")
            .field("height", &self.height())
            .field("utxos", &self.utxos.len())
            .field("leases", &self.registry.len())
            .field("mempool", &self.mempool.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainBuilder;
    use crate::crypto::KeyPair;
    use crate::data_structures::transaction::TxIn;
    use crate::events::listeners::{MemoryEventHandle, MemoryEventListener};
    use crate::params::regtest_spork_key;
    use crate::registry::LeaseState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        chain: ChainState,
        events: MemoryEventHandle,
        rng: StdRng,
        owner: KeyPair,
        leaser: KeyPair,
        producer: KeyHash,
    }

    fn fixture(sporks_on: bool) -> Fixture {
        let mut rng = StdRng::seed_from_u64(42);
        let listener = MemoryEventListener::new();
        let events = listener.handle();
        let chain = ChainBuilder::new()
            .with_event_listener(Box::new(listener))
            .build()
            .unwrap();
        if sporks_on {
            let key = regtest_spork_key();
            for id in SporkId::ALL {
                let message = SporkMessage::sign(&key, id, true, 1, &mut rng).unwrap();
                chain.apply_spork(&message).unwrap();
            }
        }
        Fixture {
            chain,
            events,
            owner: KeyPair::random(&mut rng),
            leaser: KeyPair::random(&mut rng),
            producer: KeyHash([0xaa; 20]),
            rng,
        }
    }

    fn spend(key: &KeyPair, prevout: OutPoint, outputs: Vec<TxOut>, rng: &mut StdRng) -> Transaction {
        let mut tx = Transaction::new(vec![TxIn::unsigned(prevout)], outputs);
        tx.inputs[0].witness = key.sign_input(&tx, 0, rng).unwrap();
        tx
    }

    /// Mine a block paying `owner` and return the coinbase outpoint
    fn fund(f: &mut Fixture) -> OutPoint {
        let block = f.chain.generate_block(f.owner.key_hash(), false).unwrap();
        block.coinbase.outpoint(0)
    }

    fn lease_output(f: &Fixture, coins: u64) -> TxOut {
        TxOut::new(
            Amount::from_coins(coins),
            ClassifiedScript::Lease {
                owner: f.owner.key_hash(),
                leaser: f.leaser.key_hash(),
            }
            .to_script(),
        )
    }

    #[test]
    fn test_coinbase_spend_and_fee_collection() {
        let mut f = fixture(false);
        let coin = fund(&mut f);
        let payee = ClassifiedScript::Standard(KeyHash([7u8; 20])).to_script();
        let tx = spend(
            &f.owner,
            coin,
            vec![TxOut::new(Amount::from_coins(249), payee)],
            &mut f.rng,
        );
        f.chain.accept_to_mempool(tx.clone()).unwrap();
        let block = f.chain.generate_block(f.producer, false).unwrap();

        assert_eq!(block.transactions, vec![tx.clone()]);
        assert_eq!(block.coinbase.total_output(), Amount::from_coins(251));
        assert!(f.chain.mempool().is_empty());
        assert!(!f.chain.utxos().contains(&coin));
        assert!(f.chain.utxos().contains(&tx.outpoint(0)));
        assert_eq!(f.events.count_of_type("BlockConnected"), 2);
    }

    #[test]
    fn test_mempool_rejects_conflicting_spend() {
        let mut f = fixture(false);
        let coin = fund(&mut f);
        let first = spend(
            &f.owner,
            coin,
            vec![TxOut::new(Amount::from_coins(249), ClassifiedScript::Standard(KeyHash([1u8; 20])).to_script())],
            &mut f.rng,
        );
        let second = spend(
            &f.owner,
            coin,
            vec![TxOut::new(Amount::from_coins(248), ClassifiedScript::Standard(KeyHash([2u8; 20])).to_script())],
            &mut f.rng,
        );
        f.chain.accept_to_mempool(first).unwrap();
        assert!(matches!(
            f.chain.accept_to_mempool(second),
            Err(LeasingError::DoubleSpend(outpoint)) if outpoint == coin
        ));
    }

    #[test]
    fn test_lease_creation_requires_spork() {
        let mut f = fixture(false);
        let coin = fund(&mut f);
        let output = lease_output(&f, 100);
        let tx = spend(&f.owner, coin, vec![output], &mut f.rng);
        assert!(matches!(
            f.chain.accept_to_mempool(tx),
            Err(LeasingError::PolicyDisabled {
                feature: SporkId::LeasingEnforcement
            })
        ));
    }

    #[test]
    fn test_transactions_cannot_mint_reward_outputs() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let script = ClassifiedScript::LeaseReward {
            owner: f.owner.key_hash(),
            leaser: f.leaser.key_hash(),
        }
        .to_script();
        let tx = spend(&f.owner, coin, vec![TxOut::new(Amount::from_coins(1), script)], &mut f.rng);
        assert!(matches!(
            f.chain.accept_to_mempool(tx),
            Err(LeasingError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn test_leaser_cannot_spend_lease() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let lease = spend(&f.owner, coin, vec![lease_output(&f, 100)], &mut f.rng);
        f.chain.accept_to_mempool(lease.clone()).unwrap();
        f.chain.generate_block(f.producer, false).unwrap();

        let theft = spend(
            &f.leaser,
            lease.outpoint(0),
            vec![TxOut::new(Amount::from_coins(99), ClassifiedScript::Standard(f.leaser.key_hash()).to_script())],
            &mut f.rng,
        );
        let err = f.chain.accept_to_mempool(theft).unwrap_err();
        match err {
            LeasingError::UnauthorizedSpend { outpoint, reason } => {
                assert_eq!(outpoint, lease.outpoint(0));
                assert!(reason.contains("OP_CHECKLEASEVERIFY"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_lease_matures_and_pays_rewards() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let lease = spend(&f.owner, coin, vec![lease_output(&f, 100)], &mut f.rng);
        f.chain.accept_to_mempool(lease.clone()).unwrap();
        f.chain.generate_block(f.producer, false).unwrap();
        let outpoint = lease.outpoint(0);

        let record = f.chain.registry().get(&outpoint).unwrap();
        assert_eq!(record.confirmed_height, 2);
        assert_eq!(record.maturity_height, 5);
        assert_eq!(f.chain.total_leased_to(&f.leaser.key_hash()), Amount::from_coins(100));

        while f.chain.height() < 5 {
            f.chain.generate_block(f.producer, false).unwrap();
        }
        assert_eq!(f.chain.registry().get(&outpoint).unwrap().state, LeaseState::Mature);

        while f.chain.height() < 14 {
            let block = f.chain.generate_block(f.leaser.key_hash(), true).unwrap();
            assert!(block.rewards.is_empty());
        }
        let block = f.chain.generate_block(f.leaser.key_hash(), true).unwrap();
        assert_eq!(block.height(), 15);
        assert_eq!(block.rewards.entries.len(), 2);
        assert_eq!(
            f.chain.registry().get(&outpoint).unwrap().last_reward_height,
            15
        );
        let reward_outpoint = OutPoint::new(block.rewards.txid(), 0);
        let entry = f.chain.utxos().get(&reward_outpoint).unwrap();
        assert_eq!(
            entry.classification,
            ClassifiedScript::LeaseReward {
                owner: f.owner.key_hash(),
                leaser: f.leaser.key_hash(),
            }
        );
        assert_eq!(f.events.count_of_type("RewardGranted"), 2);
        assert_eq!(f.events.count_of_type("LeaseMatured"), 1);
    }

    #[test]
    fn test_forged_reward_amount_is_rejected() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let lease = spend(&f.owner, coin, vec![lease_output(&f, 100)], &mut f.rng);
        f.chain.accept_to_mempool(lease).unwrap();
        while f.chain.height() < 14 {
            f.chain.generate_block(f.producer, false).unwrap();
        }
        let mut block = f.chain.assemble_block(f.leaser.key_hash(), true).unwrap();
        assert!(!block.rewards.is_empty());
        block.rewards.entries[0].output.value += Amount(1);
        assert!(matches!(
            f.chain.connect_block(block),
            Err(LeasingError::RewardMismatch { height: 15, .. })
        ));
        assert_eq!(f.chain.height(), 14);
    }

    #[test]
    fn test_leaser_claim_must_match_producer() {
        let mut f = fixture(true);
        let mut block = f.chain.assemble_block(f.producer, true).unwrap();
        block.header.leaser = Some(f.leaser.key_hash());
        assert!(matches!(
            f.chain.connect_block(block),
            Err(LeasingError::InvalidBlock { height: 1, .. })
        ));
    }

    #[test]
    fn test_disconnect_restores_previous_state() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let utxos_before = f.chain.utxos().clone();
        let registry_before = f.chain.registry().clone();

        let lease = spend(&f.owner, coin, vec![lease_output(&f, 100)], &mut f.rng);
        f.chain.accept_to_mempool(lease.clone()).unwrap();
        f.chain.generate_block(f.producer, false).unwrap();
        assert_eq!(f.chain.registry().len(), 1);

        let block = f.chain.disconnect_tip().unwrap();
        assert_eq!(block.height(), 2);
        assert_eq!(f.chain.height(), 1);
        assert_eq!(f.chain.utxos(), &utxos_before);
        assert_eq!(f.chain.registry(), &registry_before);
        assert!(f.chain.mempool().contains(&lease.txid()));
        assert_eq!(f.events.count_of_type("Reorg"), 1);
    }

    #[test]
    fn test_rollback_above_tip_is_a_no_op() {
        let mut f = fixture(true);
        fund(&mut f);
        fund(&mut f);
        assert!(f.chain.rollback_to(3).unwrap().is_empty());
        assert!(f.chain.rollback_to(10).unwrap().is_empty());
        assert_eq!(f.chain.height(), 2);
        assert_eq!(f.events.count_of_type("Reorg"), 0);

        assert_eq!(f.chain.rollback_to(2).unwrap().len(), 1);
        assert_eq!(f.events.count_of_type("Reorg"), 1);
    }

    #[test]
    fn test_service_node_registration_applies_from_next_block() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let lease = spend(&f.owner, coin, vec![lease_output(&f, 100)], &mut f.rng);
        f.chain.accept_to_mempool(lease).unwrap();
        while f.chain.height() < 14 {
            f.chain.generate_block(f.producer, false).unwrap();
        }
        let leaser = f.leaser.key_hash();
        let block = f.chain.generate_block(leaser, true).unwrap();
        assert_eq!(block.rewards.entries[1].source, RewardSource::Leaser(LeaserRole::Ordinary));

        // Registering on top of block 15 does not change block 15
        f.chain.register_service_node(leaser);
        assert_eq!(f.chain.leaser_role(&leaser), LeaserRole::ServiceNode);
        assert_eq!(f.chain.service_nodes().role_at(&leaser, 15), LeaserRole::Ordinary);

        let disconnected = f.chain.disconnect_tip().unwrap();
        assert_eq!(disconnected, block);
        assert_eq!(f.chain.leaser_role(&leaser), LeaserRole::Ordinary);
        f.chain.connect_block(disconnected).unwrap();
        assert_eq!(f.chain.height(), 15);

        // Re-registered, the role holds from block 16
        f.chain.register_service_node(leaser);
        let next = f.chain.assemble_block(leaser, true).unwrap();
        assert!(next.rewards.is_empty());
        assert_eq!(f.chain.service_nodes().role_at(&leaser, 16), LeaserRole::ServiceNode);
        f.chain.remove_service_node(&leaser);
        assert_eq!(f.chain.service_nodes().role_at(&leaser, 16), LeaserRole::Ordinary);
    }

    #[test]
    fn test_self_lease_rewards_keep_their_roles() {
        let mut f = fixture(true);
        let coin = fund(&mut f);
        let own = f.owner.key_hash();
        let self_lease = TxOut::new(
            Amount::from_coins(100),
            ClassifiedScript::Lease { owner: own, leaser: own }.to_script(),
        );
        let lease = spend(&f.owner, coin, vec![self_lease], &mut f.rng);
        f.chain.accept_to_mempool(lease).unwrap();
        while f.chain.height() < 14 {
            f.chain.generate_block(f.producer, false).unwrap();
        }
        let block = f.chain.generate_block(own, true).unwrap();
        assert_eq!(block.rewards.entries.len(), 2);

        let txid = block.rewards.txid();
        let leasee = f.chain.registry().get(&OutPoint::new(txid, 0)).unwrap();
        let leaser = f.chain.registry().get(&OutPoint::new(txid, 1)).unwrap();
        assert_eq!(leasee.classification, leaser.classification);
        assert_eq!(leasee.role, crate::registry::LeaseRole::Owner);
        assert_eq!(leaser.role, crate::registry::LeaseRole::Leaser);
    }

    #[test]
    fn test_stake_input_checks() {
        let mut f = fixture(true);
        let staker = KeyPair::random(&mut f.rng);
        let coin = fund(&mut f);
        let delegation = spend(
            &f.owner,
            coin,
            vec![TxOut::new(
                Amount::from_coins(100),
                ClassifiedScript::ColdStake {
                    owner: f.owner.key_hash(),
                    staker: staker.key_hash(),
                }
                .to_script(),
            )],
            &mut f.rng,
        );
        f.chain.accept_to_mempool(delegation.clone()).unwrap();
        f.chain.generate_block(f.producer, false).unwrap();

        let message = b"kernel";
        let witness = Witness {
            public_key: staker.public_key_bytes(),
            signature: staker.sign(message, &mut f.rng).unwrap(),
        };
        f.chain
            .check_stake_input(&delegation.outpoint(0), &witness, message)
            .unwrap();

        let spend_attempt = spend(
            &staker,
            delegation.outpoint(0),
            vec![TxOut::new(Amount::from_coins(99), ClassifiedScript::Standard(staker.key_hash()).to_script())],
            &mut f.rng,
        );
        assert!(matches!(
            f.chain.accept_to_mempool(spend_attempt),
            Err(LeasingError::UnauthorizedSpend { .. })
        ));
    }
}
