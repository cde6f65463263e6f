//! Usage counters for the admin surface

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the registry and the publisher
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    events_published: AtomicU64,
    deliveries: AtomicU64,
    deliveries_dropped: AtomicU64,
    evictions: AtomicU64,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_publish(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn deliveries_dropped(&self) -> u64 {
        self.deliveries_dropped.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Inventories with at least one subscriber
    pub inventories: usize,
    /// Registered connections that are still open
    pub connections: usize,
    /// Connections currently subscribed to an inventory
    pub subscribed_connections: usize,
    /// Events handed to the publisher
    pub events_published: u64,
    /// Frames queued to subscribers
    pub deliveries: u64,
    /// Deliveries skipped (full queue or closed connection)
    pub deliveries_dropped: u64,
    /// Inventories evicted
    pub evictions: u64,
}

/// Aggregate usage reported to admins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Inventories known to the store
    pub inventories: usize,
    /// Products across all inventories
    pub products: usize,
    /// Sum of all product quantities
    pub total_quantity: i64,
    /// Live registry state
    pub live: RegistryStats,
}
