//! Connection registry implementation
//!
//! Maps inventory ids to the live connections subscribed to them and tracks
//! each connection's current subscription.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::config::RegistryConfig;
use super::entry::{ConnectionHandle, ConnectionReceiver, SubscriberSet};
use super::event::InventoryId;
use crate::stats::{RegistryMetrics, RegistryStats};

/// A registered connection and what it is subscribed to
struct ConnectionSlot {
    handle: ConnectionHandle,
    current: Option<InventoryId>,
}

#[derive(Default)]
struct RegistryState {
    /// Never holds an empty set
    sets: HashMap<InventoryId, SubscriberSet>,
    connections: HashMap<u64, ConnectionSlot>,
}

impl RegistryState {
    /// Drop `connection_id` from the set of `inventory`, removing the set
    /// entry once it is empty
    fn leave(&mut self, inventory: &InventoryId, connection_id: u64) {
        if let Some(set) = self.sets.get_mut(inventory) {
            set.remove(connection_id);
            if set.is_empty() {
                self.sets.remove(inventory);
            }
        }
    }
}

/// Registry of live subscriptions
///
/// One instance is shared (behind `Arc`) by every connection task and every
/// mutation handler. All operations are synchronous and hold the lock only
/// for map updates or a snapshot copy, never across I/O, so they are safe
/// to call from `Drop`.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    metrics: Arc<RegistryMetrics>,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            metrics: Arc::new(RegistryMetrics::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RegistryMetrics> {
        &self.metrics
    }

    /// Register a new connection in the `Unsubscribed` state
    ///
    /// Returns its handle and the receiver its transport task drains.
    pub fn register(&self, connection_id: u64) -> (ConnectionHandle, ConnectionReceiver) {
        let (handle, receiver) =
            ConnectionHandle::channel(connection_id, self.config.outbound_queue_capacity);

        let mut state = self.state.write();
        if let Some(old) = state.connections.insert(
            connection_id,
            ConnectionSlot {
                handle: handle.clone(),
                current: None,
            },
        ) {
            // Id reuse: the old handle must not linger in a set
            tracing::warn!(connection_id, "Connection id registered twice");
            if let Some(inventory) = old.current {
                state.leave(&inventory, connection_id);
            }
        }

        tracing::debug!(connection_id, "Connection registered");
        (handle, receiver)
    }

    /// Subscribe `connection` to `inventory`
    ///
    /// Leaves the previous subscription (if any) in the same critical
    /// section, so the connection is never visible in two sets. Any id is
    /// accepted. Returns false if the connection was already subscribed to
    /// `inventory` or has been evicted, in which case nothing changes.
    pub fn subscribe(&self, connection: &ConnectionHandle, inventory: InventoryId) -> bool {
        let connection_id = connection.id();
        let mut guard = self.state.write();
        let state = &mut *guard;

        // Eviction is signalled under this lock, so the check can't race it
        if connection.is_evicted() {
            drop(guard);
            tracing::debug!(connection_id, inventory = %inventory, "Evicted, subscribe ignored");
            return false;
        }

        let previous = match state.connections.get_mut(&connection_id) {
            Some(slot) => {
                if slot.current.as_ref() == Some(&inventory) {
                    return false;
                }
                slot.current.replace(inventory.clone())
            }
            None => {
                state.connections.insert(
                    connection_id,
                    ConnectionSlot {
                        handle: connection.clone(),
                        current: Some(inventory.clone()),
                    },
                );
                None
            }
        };

        if let Some(previous) = &previous {
            state.leave(previous, connection_id);
        }

        let set = state.sets.entry(inventory.clone()).or_default();
        set.insert(connection.clone());
        let subscribers = set.len();
        drop(guard);

        tracing::info!(
            connection_id,
            inventory = %inventory,
            previous = ?previous.as_ref().map(InventoryId::as_str),
            subscribers,
            "Subscribed"
        );
        true
    }

    /// Remove the connection from its current set, if any
    ///
    /// Idempotent. Returns the inventory it was subscribed to.
    pub fn unsubscribe(&self, connection_id: u64) -> Option<InventoryId> {
        let mut state = self.state.write();

        let previous = state
            .connections
            .get_mut(&connection_id)
            .and_then(|slot| slot.current.take())?;
        state.leave(&previous, connection_id);
        drop(state);

        tracing::debug!(connection_id, inventory = %previous, "Unsubscribed");
        Some(previous)
    }

    /// Unsubscribe and forget the connection
    ///
    /// Called exactly once when a connection terminates; calling it again is
    /// a no-op.
    pub fn unregister(&self, connection_id: u64) {
        let mut state = self.state.write();

        if let Some(slot) = state.connections.remove(&connection_id) {
            if let Some(inventory) = slot.current {
                state.leave(&inventory, connection_id);
            }
            drop(state);
            tracing::debug!(connection_id, "Connection unregistered");
        }
    }

    /// Snapshot of the connections subscribed to `inventory`
    ///
    /// Empty if there are none. Later subscribe/unsubscribe calls do not
    /// affect the returned list.
    pub fn subscribers_of(&self, inventory: &InventoryId) -> Vec<ConnectionHandle> {
        self.state
            .read()
            .sets
            .get(inventory)
            .map(SubscriberSet::snapshot)
            .unwrap_or_default()
    }

    /// Evict every subscriber of a deleted inventory
    ///
    /// Each subscriber is unsubscribed and signalled to send the
    /// `inventory:deleted` notice and close. Returns how many were evicted.
    pub fn evict_inventory(&self, inventory: &InventoryId) -> usize {
        let evicted = {
            let mut state = self.state.write();
            let members = match state.sets.remove(inventory) {
                Some(mut set) => set.drain(),
                None => Vec::new(),
            };
            // Signal under the lock so a later subscribe can't be evicted
            for handle in &members {
                if let Some(slot) = state.connections.get_mut(&handle.id()) {
                    slot.current = None;
                }
                handle.evict();
            }
            members
        };

        self.metrics.record_eviction();

        tracing::info!(
            inventory = %inventory,
            subscribers = evicted.len(),
            "Inventory evicted"
        );
        evicted.len()
    }

    /// Inventory the connection is currently subscribed to
    pub fn current_subscription(&self, connection_id: u64) -> Option<InventoryId> {
        self.state
            .read()
            .connections
            .get(&connection_id)
            .and_then(|slot| slot.current.clone())
    }

    /// Whether a subscriber set exists for `inventory`
    pub fn has_subscribers(&self, inventory: &InventoryId) -> bool {
        self.state.read().sets.contains_key(inventory)
    }

    /// Number of inventories with at least one subscriber
    pub fn inventory_count(&self) -> usize {
        self.state.read().sets.len()
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// Current registry statistics
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let subscribed_connections = state.sets.values().map(SubscriberSet::len).sum();
        let open_connections = state
            .connections
            .values()
            .filter(|slot| slot.handle.is_open())
            .count();

        RegistryStats {
            inventories: state.sets.len(),
            connections: open_connections,
            subscribed_connections,
            events_published: self.metrics.events_published(),
            deliveries: self.metrics.deliveries(),
            deliveries_dropped: self.metrics.deliveries_dropped(),
            evictions: self.metrics.evictions(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
