//! In-memory inventory store
//!
//! Stands in for the persistent collaborator: it performs the write, then
//! notifies the [`EventPublisher`](crate::publisher::EventPublisher).
//! Publish outcomes never change what a store call returns.

pub mod error;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::{InventoryStore, InventorySummary};
