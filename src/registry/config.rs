//! Registry configuration

/// Default depth of each connection's outbound queue
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Configuration for the connection registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames buffered per connection before deliveries to it are dropped
    pub outbound_queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Set the per-connection outbound queue depth (at least 1)
    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }
}
