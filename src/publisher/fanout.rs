//! Publisher implementation

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::registry::{ConnectionRegistry, DeliveryError, Event, InventoryId};

type Lane = Arc<Mutex<()>>;

/// Delivers events to the subscribers of their inventory
///
/// Each inventory with a dispatch in flight has its own lane. Publishes for
/// the same inventory take that lane one at a time, so every subscriber sees
/// them in call order. Different inventories never share a lane. A lane is
/// dropped once nobody holds or waits on it.
pub struct EventPublisher {
    registry: Arc<ConnectionRegistry>,
    lanes: Mutex<HashMap<InventoryId, Lane>>,
}

impl EventPublisher {
    /// Create a publisher over `registry`
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `event` to every connection subscribed to `inventory`
    ///
    /// Takes a snapshot of the subscriber set and queues one shared frame
    /// to each member without waiting. A full queue or closed connection
    /// skips that member only. Connections that subscribe after the
    /// snapshot do not get the event.
    ///
    /// [`Event::InventoryDeleted`] evicts the subscribers instead, as
    /// [`evict_inventory`](Self::evict_inventory) does.
    pub fn publish(&self, inventory: &InventoryId, event: Event) {
        if matches!(event, Event::InventoryDeleted) {
            self.evict_inventory(inventory);
            return;
        }

        self.registry.metrics().record_publish();
        self.in_lane(inventory, || self.dispatch(inventory, &event));
    }

    fn dispatch(&self, inventory: &InventoryId, event: &Event) {
        let metrics = self.registry.metrics();
        let subscribers = self.registry.subscribers_of(inventory);
        if subscribers.is_empty() {
            tracing::trace!(inventory = %inventory, kind = event.kind(), "No subscribers");
            return;
        }

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(inventory = %inventory, error = %e, "Failed to encode event");
                return;
            }
        };

        let mut delivered = 0usize;
        for handle in &subscribers {
            match handle.deliver(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    metrics.record_delivery();
                }
                Err(DeliveryError::QueueFull) => {
                    metrics.record_dropped();
                    tracing::warn!(
                        connection_id = handle.id(),
                        inventory = %inventory,
                        kind = event.kind(),
                        "Outbound queue full, event dropped"
                    );
                }
                Err(DeliveryError::Closed) => {
                    metrics.record_dropped();
                    tracing::debug!(
                        connection_id = handle.id(),
                        inventory = %inventory,
                        "Subscriber already closed, skipped"
                    );
                }
            }
        }

        tracing::debug!(
            inventory = %inventory,
            kind = event.kind(),
            subscribers = subscribers.len(),
            delivered,
            "Event published"
        );
    }

    /// Evict every subscriber of a deleted inventory
    ///
    /// Shares the inventory's lane with `publish`, so events published
    /// before the deletion are queued ahead of the eviction notice.
    pub fn evict_inventory(&self, inventory: &InventoryId) -> usize {
        self.in_lane(inventory, || self.registry.evict_inventory(inventory))
    }

    /// Number of inventories with a dispatch in flight
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().len()
    }

    /// Run `f` holding the inventory's lane
    fn in_lane<R>(&self, inventory: &InventoryId, f: impl FnOnce() -> R) -> R {
        let lane = Arc::clone(self.lanes.lock().entry(inventory.clone()).or_default());

        let result = {
            let _turn = lane.lock();
            f()
        };

        // Clones are only taken under the map lock, so a count of two (map
        // plus ours) means no one else holds or waits on this lane
        let mut lanes = self.lanes.lock();
        if Arc::strong_count(&lane) == 2 {
            lanes.remove(inventory);
        }
        result
    }
}
