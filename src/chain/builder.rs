//! Fluent construction of a [`ChainState`]
//!
//! The builder collects consensus parameters, an optional shared spork
//! manager, known service nodes and event listeners, then validates the
//! configuration once in [`ChainBuilder::build`].

use std::collections::BTreeSet;

use crate::chain::service_nodes::ServiceNodeSet;
use crate::chain::ChainState;
use crate::data_structures::types::KeyHash;
use crate::errors::{ParamsError, SporkError};
use crate::events::{EventDispatcher, EventDispatcherError, EventListener};
use crate::params::ConsensusParams;
use crate::sporks::{SporkManager, SporkMessage};

/// Errors that can occur while building a chain
#[derive(Debug, thiserror::Error)]
pub enum ChainBuildError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ParamsError),
    #[error("Event listener error: {0}")]
    EventListener(#[from] EventDispatcherError),
    #[error("Initial spork rejected: {0}")]
    Spork(#[from] SporkError),
}

/// Builder for [`ChainState`]
///
/// ```rust
/// use p2l_leasing_libs::chain::ChainBuilder;
/// use p2l_leasing_libs::events::listeners::MemoryEventListener;
/// use p2l_leasing_libs::params::ConsensusParams;
///
/// let listener = MemoryEventListener::new();
/// let events = listener.handle();
/// let chain = ChainBuilder::new()
///     .with_params(ConsensusParams::regtest())
///     .with_event_listener(Box::new(listener))
///     .build()
///     .unwrap();
/// assert_eq!(chain.height(), 0);
/// assert!(events.is_empty());
/// ```
pub struct ChainBuilder {
    params: ConsensusParams,
    sporks: Option<SporkManager>,
    initial_sporks: Vec<SporkMessage>,
    service_nodes: BTreeSet<KeyHash>,
    listeners: Vec<Box<dyn EventListener>>,
    max_listeners: Option<usize>,
}

impl ChainBuilder {
    /// Start from the regtest parameters with no listeners
    pub fn new() -> Self {
        Self {
            params: ConsensusParams::regtest(),
            sporks: None,
            initial_sporks: Vec::new(),
            service_nodes: BTreeSet::new(),
            listeners: Vec::new(),
            max_listeners: None,
        }
    }

    pub fn with_params(mut self, params: ConsensusParams) -> Self {
        self.params = params;
        self
    }

    /// Share an existing spork manager, e.g. with a wallet
    pub fn with_spork_manager(mut self, sporks: SporkManager) -> Self {
        self.sporks = Some(sporks);
        self
    }

    /// Apply a signed spork message before the first block
    pub fn with_spork(mut self, message: SporkMessage) -> Self {
        self.initial_sporks.push(message);
        self
    }

    /// Service node from the first block on
    pub fn with_service_node(mut self, key_hash: KeyHash) -> Self {
        self.service_nodes.insert(key_hash);
        self
    }

    pub fn with_event_listener(mut self, listener: Box<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = Some(max);
        self
    }

    pub fn build(self) -> Result<ChainState, ChainBuildError> {
        self.params.validate()?;

        let sporks = match self.sporks {
            Some(sporks) => sporks,
            None => SporkManager::new(self.params.spork_public_key_bytes()?),
        };
        for message in &self.initial_sporks {
            sporks.apply(message)?;
        }

        let mut events = match self.max_listeners {
            Some(max) => EventDispatcher::new_with_limit(max),
            None => EventDispatcher::new(),
        };
        for listener in self.listeners {
            events.register(listener)?;
        }

        let service_nodes = ServiceNodeSet::with_genesis_members(self.service_nodes);
        Ok(ChainState::new(self.params, sporks, service_nodes, events))
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
