//! WebSocket server
//!
//! Accepts connections, runs one [`Connection`] task per client and wires
//! them to the shared registry.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::InventoryServer;
