//! In-memory listener capturing events for tests and tooling

use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::events::types::EventType;
use crate::events::{EventListener, LeasingEvent};

/// Shared view over the events captured by a [`MemoryEventListener`]
#[derive(Debug, Clone, Default)]
pub struct MemoryEventHandle {
    events: Arc<Mutex<Vec<LeasingEvent>>>,
}

impl MemoryEventHandle {
    fn lock(&self) -> MutexGuard<'_, Vec<LeasingEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn events(&self) -> Vec<LeasingEvent> {
        self.lock().clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<LeasingEvent> {
        self.lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn count_of_type(&self, event_type: &str) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Listener that stores every event it receives
#[derive(Debug, Clone, Default)]
pub struct MemoryEventListener {
    handle: MemoryEventHandle,
    max_events: Option<usize>,
}

impl MemoryEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_events`, dropping the oldest
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn handle(&self) -> MemoryEventHandle {
        self.handle.clone()
    }
}

impl EventListener for MemoryEventListener {
    fn handle_event(&mut self, event: &LeasingEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut events = self.handle.lock();
        events.push(event.clone());
        if let Some(max) = self.max_events {
            let excess = events.len().saturating_sub(max);
            events.drain(..excess);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MemoryEventListener"
    }
}
