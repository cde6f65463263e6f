//! Event fan-out
//!
//! Mutation handlers call [`EventPublisher::publish`] after their write has
//! completed. Delivery is best-effort and never reports failure back to
//! the writer.

pub mod fanout;

pub use fanout::EventPublisher;
