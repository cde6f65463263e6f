//! Scoped registry membership
//!
//! A connection holds exactly one [`SubscriptionGuard`] for its whole
//! lifetime. Dropping the guard unregisters the connection, so every exit
//! path (close frame, socket error, idle timeout, eviction, task abort)
//! leaves the registry clean before the handle is discarded.

use std::sync::Arc;

use crate::registry::{ConnectionHandle, ConnectionReceiver, ConnectionRegistry, InventoryId};

/// Owns a connection's registration in the registry
pub struct SubscriptionGuard {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
}

impl SubscriptionGuard {
    /// Register `connection_id` and return the guard with the receiver for
    /// its outbound queue
    pub fn register(
        registry: Arc<ConnectionRegistry>,
        connection_id: u64,
    ) -> (Self, ConnectionReceiver) {
        let (handle, receiver) = registry.register(connection_id);
        (Self { registry, handle }, receiver)
    }

    pub fn connection_id(&self) -> u64 {
        self.handle.id()
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Subscribe to `inventory`; false if already subscribed to it
    pub fn subscribe(&self, inventory: InventoryId) -> bool {
        self.registry.subscribe(&self.handle, inventory)
    }

    /// Whether the registry has evicted this connection
    pub fn is_evicted(&self) -> bool {
        self.handle.is_evicted()
    }

    /// Leave the current inventory, if any
    pub fn unsubscribe(&self) -> Option<InventoryId> {
        self.registry.unsubscribe(self.handle.id())
    }

    /// Inventory the registry has this connection subscribed to
    pub fn current(&self) -> Option<InventoryId> {
        self.registry.current_subscription(self.handle.id())
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.handle.id());
    }
}
