//! Connection registry for live inventory updates
//!
//! The registry owns the mapping from inventory id to the connections
//! currently subscribed to it. Mutation handlers reach it through the
//! [`EventPublisher`](crate::publisher::EventPublisher); connection tasks
//! reach it through their [`SubscriptionGuard`](crate::session::SubscriptionGuard).
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ConnectionRegistry>
//!                  ┌───────────────────────────────┐
//!                  │ sets: HashMap<InventoryId,    │
//!                  │   SubscriberSet { handles }>  │
//!                  │ connections: HashMap<id,      │
//!                  │   { handle, current }>        │
//!                  └───────────────┬───────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!  [Store write]             [Connection]              [Connection]
//!  publisher.publish()       receiver.next()           receiver.next()
//!        │                         │                         │
//!        └──► subscribers_of() ──► handle.deliver() ──► WebSocket
//! ```
//!
//! Each connection has its own bounded outbound queue, so a stalled socket
//! only loses its own deliveries.

pub mod config;
pub mod connections;
pub mod entry;
pub mod event;

pub use config::RegistryConfig;
pub use connections::ConnectionRegistry;
pub use entry::{ConnectionHandle, ConnectionReceiver, DeliveryError, Outbound, SubscriberSet};
pub use event::{Event, InventoryId};
