//! Built-in event listeners
//!
//! - [`MemoryEventListener`]: captures events behind a shared handle
//! - [`TracingEventListener`]: forwards events to `tracing` (`tracing` feature)

pub mod memory;
#[cfg(feature = "tracing")]
pub mod tracing_logger;

pub use memory::{MemoryEventHandle, MemoryEventListener};
#[cfg(feature = "tracing")]
pub use tracing_logger::{LogLevel, TracingEventListener};
