//! Event system for lease lifecycle notifications
//!
//! The chain harness emits a [`LeasingEvent`] for every registry transition
//! and block operation. Listeners are registered with an [`EventDispatcher`]
//! which delivers events in registration order.
//!
//! # Core Components
//!
//! - [`EventListener`] trait: interface for handling events
//! - [`EventDispatcher`]: manages listeners and isolates their failures
//! - [`listeners`]: tracing and in-memory listeners
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use p2l_leasing_libs::events::EventDispatcher;
//! use p2l_leasing_libs::events::listeners::MemoryEventListener;
//!
//! let mut dispatcher = EventDispatcher::new();
//! let memory = MemoryEventListener::new();
//! let events = memory.handle();
//! dispatcher.register(Box::new(memory)).unwrap();
//! assert_eq!(events.len(), 0);
//! ```

use std::collections::{HashMap, HashSet};
use std::error::Error;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

pub mod listeners;
pub mod types;

pub use types::*;

/// Errors that can occur during event dispatcher operations
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EventDispatcherError {
    #[error("Listener with name '{0}' is already registered")]
    DuplicateListener(String),
    #[error("Cannot register listener: maximum of {max} listeners allowed, currently have {current}")]
    TooManyListeners { current: usize, max: usize },
    #[error("Invalid listener name: '{0}'")]
    InvalidListenerName(String),
}

/// Statistics about event processing
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events_dispatched: u64,
    pub total_listener_calls: u64,
    pub total_listener_errors: u64,
    pub events_by_type: HashMap<String, u64>,
    pub errors_by_listener: HashMap<String, u64>,
}

/// Trait for handling leasing events
///
/// Errors returned by a listener are counted and logged by the dispatcher
/// but do not reach other listeners or the chain operation that emitted the
/// event.
pub trait EventListener: Send + Sync {
    fn handle_event(&mut self, event: &LeasingEvent) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Unique name used to reject duplicate registrations
    fn name(&self) -> &'static str;

    fn wants_event(&self, _event: &LeasingEvent) -> bool {
        true
    }
}

/// Delivers events to registered listeners
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
    registered_names: HashSet<String>,
    max_listeners: Option<usize>,
    stats: EventStats,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_limit(max_listeners: usize) -> Self {
        Self {
            max_listeners: Some(max_listeners),
            ..Self::default()
        }
    }

    pub fn register(&mut self, listener: Box<dyn EventListener>) -> Result<(), EventDispatcherError> {
        let listener_name = listener.name().to_string();

        if listener_name.trim().is_empty() {
            return Err(EventDispatcherError::InvalidListenerName(listener_name));
        }
        if self.registered_names.contains(&listener_name) {
            return Err(EventDispatcherError::DuplicateListener(listener_name));
        }
        if let Some(max) = self.max_listeners {
            if self.listeners.len() >= max {
                return Err(EventDispatcherError::TooManyListeners {
                    current: self.listeners.len(),
                    max,
                });
            }
        }

        #[cfg(feature = "tracing")]
        debug!(listener = %listener_name, "Registering event listener");

        self.registered_names.insert(listener_name);
        self.listeners.push(listener);
        Ok(())
    }

    /// Deliver `event` to every interested listener
    pub fn dispatch(&mut self, event: &LeasingEvent) {
        let event_type = event.event_type();
        self.stats.total_events_dispatched += 1;
        *self
            .stats
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;

        for listener in &mut self.listeners {
            if !listener.wants_event(event) {
                continue;
            }
            self.stats.total_listener_calls += 1;

            if let Err(_e) = listener.handle_event(event) {
                self.stats.total_listener_errors += 1;
                *self
                    .stats
                    .errors_by_listener
                    .entry(listener.name().to_string())
                    .or_insert(0) += 1;

                #[cfg(feature = "tracing")]
                warn!(listener = listener.name(), event = event_type, error = %_e, "Event listener failed");
            }
        }
    }

    pub fn dispatch_all(&mut self, events: &[LeasingEvent]) {
        for event in events {
            self.dispatch(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn has_listener(&self, name: &str) -> bool {
        self.registered_names.contains(name)
    }

    pub fn get_stats(&self) -> &EventStats {
        &self.stats
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.registered_names)
            .field("stats", &self.stats)
            .finish()
    }
}
