//! Statistics for the registry and the admin surface

pub mod metrics;

pub use metrics::{RegistryMetrics, RegistryStats, UsageStats};
