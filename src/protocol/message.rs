//! JSON wire messages
//!
//! Every frame on the socket is a JSON object with a `type` discriminator.
//! Clients only ever send `subscribe`; everything else flows server → client.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text of the greeting sent as soon as a connection is established
pub const CONNECTED_MESSAGE: &str = "Connected to inventory updates";

/// Text of the notice sent before a connection is closed by eviction
pub const INVENTORY_DELETED_MESSAGE: &str = "This inventory has been deleted";

/// A product as it appears in event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub quantity: i64,
    pub inventory_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request live updates for an inventory
    #[serde(rename = "subscribe")]
    Subscribe { uuid: String },
}

impl ClientMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// `data` payload of `product:added` / `product:updated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPayload {
    pub product: Product,
}

/// `data` payload of `product:deleted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIdPayload {
    #[serde(rename = "productId")]
    pub product_id: i64,
}

/// `data` payload of `inventory:name-changed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePayload {
    pub name: String,
}

/// Outbound frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected { message: String },

    #[serde(rename = "subscribed")]
    Subscribed { uuid: String },

    #[serde(rename = "product:added")]
    ProductAdded { data: ProductPayload },

    #[serde(rename = "product:updated")]
    ProductUpdated { data: ProductPayload },

    #[serde(rename = "product:deleted")]
    ProductDeleted { data: ProductIdPayload },

    #[serde(rename = "inventory:name-changed")]
    InventoryNameChanged { data: NamePayload },

    /// Terminal: the sender closes the connection right after this
    #[serde(rename = "inventory:deleted")]
    InventoryDeleted { message: String },
}

impl ServerMessage {
    pub fn connected() -> Self {
        ServerMessage::Connected {
            message: CONNECTED_MESSAGE.to_string(),
        }
    }

    pub fn subscribed(uuid: impl Into<String>) -> Self {
        ServerMessage::Subscribed { uuid: uuid.into() }
    }

    pub fn inventory_deleted() -> Self {
        ServerMessage::InventoryDeleted {
            message: INVENTORY_DELETED_MESSAGE.to_string(),
        }
    }

    /// Wire name of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::ProductAdded { .. } => "product:added",
            ServerMessage::ProductUpdated { .. } => "product:updated",
            ServerMessage::ProductDeleted { .. } => "product:deleted",
            ServerMessage::InventoryNameChanged { .. } => "inventory:name-changed",
            ServerMessage::InventoryDeleted { .. } => "inventory:deleted",
        }
    }

    /// Serialize into a shareable frame
    pub fn to_frame(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
