//! Listener forwarding events to `tracing`

use std::error::Error;

use tracing::{debug, info};

use crate::events::types::{EventType, SerializableEvent};
use crate::events::{EventListener, LeasingEvent};

/// Verbosity of the tracing listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Block connections, rewards and reorganizations
    #[default]
    Normal,
    /// Every lease transition as well
    Verbose,
}

impl LogLevel {
    pub fn should_log(&self, event: &LeasingEvent) -> bool {
        match (self, event) {
            (LogLevel::Verbose, _) => true,
            (
                LogLevel::Normal,
                LeasingEvent::BlockConnected { .. }
                | LeasingEvent::RewardGranted { .. }
                | LeasingEvent::Reorg { .. },
            ) => true,
            (LogLevel::Normal, _) => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingEventListener {
    level: LogLevel,
}

impl TracingEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Verbose,
        }
    }
}

impl EventListener for TracingEventListener {
    fn handle_event(&mut self, event: &LeasingEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let metadata = event.metadata();
        match event {
            LeasingEvent::BlockConnected { .. }
            | LeasingEvent::RewardGranted { .. }
            | LeasingEvent::Reorg { .. } => info!(
                event = event.event_type(),
                height = metadata.block_height,
                source = %metadata.source,
                "{}",
                event.summary()
            ),
            _ => debug!(
                event = event.event_type(),
                height = metadata.block_height,
                source = %metadata.source,
                "{}",
                event.summary()
            ),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TracingEventListener"
    }

    fn wants_event(&self, event: &LeasingEvent) -> bool {
        self.level.should_log(event)
    }
}
