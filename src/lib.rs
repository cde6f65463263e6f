//! Live updates for shared, UUID-addressed inventories
//!
//! Anyone holding an inventory's URL can edit it; every other viewer of the
//! same inventory receives the change over a WebSocket as soon as the write
//! completes.
//!
//! - [`registry`]: which connections watch which inventory
//! - [`publisher`]: best-effort, ordered fan-out of mutation events
//! - [`session`] / [`server`]: the WebSocket side and connection lifecycle
//! - [`store`]: in-memory inventory store that publishes after each write
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use inventory_live::store::InventoryStore;
//! use inventory_live::{InventoryServer, ServerConfig};
//!
//! # async fn example() -> inventory_live::Result<()> {
//! let server = InventoryServer::new(ServerConfig::default());
//! let store = Arc::new(InventoryStore::new(Arc::clone(server.publisher())));
//!
//! // Writes reach every subscribed viewer
//! let _ = store.add_product("3f2b8c1a-9d4e-4f6a-8b7c-1d2e3f4a5b6c", "Screws", Some(40));
//!
//! server.run().await
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod publisher;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
pub use publisher::EventPublisher;
pub use registry::{ConnectionRegistry, Event, InventoryId, RegistryConfig};
pub use server::{InventoryServer, ServerConfig};
