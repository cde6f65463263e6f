//! Inventory keys and mutation events
//!
//! This module defines the identifier subscriber sets are keyed by and the
//! closed set of events the publisher fans out.

use bytes::Bytes;
use uuid::Uuid;

use crate::protocol::{NamePayload, Product, ProductIdPayload, ProductPayload, ServerMessage};

/// Identifier of an inventory (the UUID from its URL)
///
/// The registry accepts any value; validating that an inventory exists is
/// the store's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InventoryId(String);

impl InventoryId {
    /// Create a new inventory id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a UUID in any accepted form into its lowercase hyphenated key
    pub fn parse_uuid(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim())
            .ok()
            .map(|parsed| Self(parsed.hyphenated().to_string()))
    }

    /// Key for a client-supplied id
    ///
    /// UUIDs map to their canonical form so every spelling of the same
    /// inventory shares one subscriber set. Anything else is kept verbatim.
    pub fn canonical(raw: &str) -> Self {
        Self::parse_uuid(raw).unwrap_or_else(|| Self::new(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InventoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InventoryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for InventoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A completed mutation on one inventory
///
/// Events are fire-and-forget: never persisted, retried or acknowledged.
/// Publishing [`Event::InventoryDeleted`] evicts every subscriber instead of
/// queueing a frame; see
/// [`ConnectionRegistry::evict_inventory`](super::ConnectionRegistry::evict_inventory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A product was created
    ProductAdded(Product),
    /// A product's quantity changed
    ProductUpdated(Product),
    /// A product was removed
    ProductDeleted { product_id: i64 },
    /// The inventory got a new display name
    InventoryRenamed { name: String },
    /// The inventory is gone; subscribers get the terminal notice
    InventoryDeleted,
}

impl Event {
    /// Wire message for this event
    pub fn to_message(&self) -> ServerMessage {
        match self {
            Event::ProductAdded(product) => ServerMessage::ProductAdded {
                data: ProductPayload {
                    product: product.clone(),
                },
            },
            Event::ProductUpdated(product) => ServerMessage::ProductUpdated {
                data: ProductPayload {
                    product: product.clone(),
                },
            },
            Event::ProductDeleted { product_id } => ServerMessage::ProductDeleted {
                data: ProductIdPayload {
                    product_id: *product_id,
                },
            },
            Event::InventoryRenamed { name } => ServerMessage::InventoryNameChanged {
                data: NamePayload { name: name.clone() },
            },
            Event::InventoryDeleted => ServerMessage::inventory_deleted(),
        }
    }

    /// Serialize once; the frame is shared by every subscriber
    pub fn to_frame(&self) -> serde_json::Result<Bytes> {
        self.to_message().to_frame()
    }

    /// Wire name of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ProductAdded(_) => "product:added",
            Event::ProductUpdated(_) => "product:updated",
            Event::ProductDeleted { .. } => "product:deleted",
            Event::InventoryRenamed { .. } => "inventory:name-changed",
            Event::InventoryDeleted => "inventory:deleted",
        }
    }
}
