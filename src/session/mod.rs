//! Per-connection session state
//!
//! A session is owned by the task serving its connection. It parses inbound
//! frames, drives the subscription state machine, and holds the
//! [`SubscriptionGuard`] that keeps the registry consistent when the
//! connection goes away.

pub mod guard;
pub mod state;

pub use guard::SubscriptionGuard;
pub use state::{Session, SessionPhase, SubscriptionState};
