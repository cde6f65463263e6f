//! Wire protocol
//!
//! JSON-framed messages exchanged over the WebSocket transport.

pub mod message;

pub use message::{
    ClientMessage, NamePayload, Product, ProductIdPayload, ProductPayload, ServerMessage,
    CONNECTED_MESSAGE, INVENTORY_DELETED_MESSAGE,
};
