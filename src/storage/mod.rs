//! Persistence of lease registry state
//!
//! Available with the `storage` feature. The chain keeps the registry in
//! memory; a node saves it after connecting blocks and reloads it on start.

pub mod sqlite;

pub use sqlite::SqliteLeaseStore;
