//! Session state machine
//!
//! Tracks one connection from open to close, and what it is subscribed to.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::guard::SubscriptionGuard;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionReceiver, ConnectionRegistry, InventoryId};

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Handshake done, exchanging messages
    Open,
    /// Close initiated (by either side, or by eviction)
    Closing,
    /// Socket closed; the session must not be reused
    Closed,
}

/// What the connection is subscribed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed(InventoryId),
}

/// Complete session state
pub struct Session {
    /// Unique connection id
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Current subscription
    pub subscription: SubscriptionState,

    /// Connection start time
    pub connected_at: Instant,

    /// Last inbound frame of any kind
    pub last_seen: Instant,

    /// Protocol messages handled
    pub messages_received: u64,

    /// Frames dropped as unparsable
    pub malformed_messages: u64,

    guard: SubscriptionGuard,
}

impl Session {
    /// Register a new session with the registry
    ///
    /// Returns the session and the receiver for its outbound queue.
    pub fn open(
        registry: Arc<ConnectionRegistry>,
        id: u64,
        peer_addr: SocketAddr,
    ) -> (Self, ConnectionReceiver) {
        let (guard, receiver) = SubscriptionGuard::register(registry, id);
        let now = Instant::now();

        let session = Self {
            id,
            peer_addr,
            phase: SessionPhase::Open,
            subscription: SubscriptionState::Unsubscribed,
            connected_at: now,
            last_seen: now,
            messages_received: 0,
            malformed_messages: 0,
            guard,
        };

        (session, receiver)
    }

    /// Note inbound activity (any frame, including pongs)
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Handle an inbound text frame
    ///
    /// Returns the reply to send, if any. Malformed frames are logged and
    /// dropped without a reply; the connection stays open.
    pub fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        self.touch();

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                self.malformed_messages += 1;
                tracing::warn!(
                    connection_id = self.id,
                    peer = %self.peer_addr,
                    error = %e,
                    "Dropping malformed frame"
                );
                return None;
            }
        };
        self.messages_received += 1;

        match message {
            ClientMessage::Subscribe { uuid } => self.on_subscribe(uuid),
        }
    }

    /// Subscribe under the canonical key; the reply echoes what the client sent
    fn on_subscribe(&mut self, requested: String) -> Option<ServerMessage> {
        if self.guard.is_evicted() {
            tracing::debug!(
                connection_id = self.id,
                inventory = %requested,
                "Subscribe after eviction ignored"
            );
            return None;
        }

        let inventory = InventoryId::canonical(&requested);
        let changed = self.guard.subscribe(inventory.clone());
        if !changed && self.guard.is_evicted() {
            return None;
        }
        self.subscription = SubscriptionState::Subscribed(inventory.clone());

        if changed {
            Some(ServerMessage::subscribed(requested))
        } else {
            tracing::debug!(
                connection_id = self.id,
                inventory = %inventory,
                "Already subscribed"
            );
            None
        }
    }

    /// The subscribed inventory was deleted; the registry already dropped
    /// this connection from its set
    pub fn on_evicted(&mut self) {
        self.subscription = SubscriptionState::Unsubscribed;
        self.phase = SessionPhase::Closing;
    }

    /// Start closing the session
    pub fn close(&mut self) {
        if self.phase == SessionPhase::Open {
            self.phase = SessionPhase::Closing;
        }
    }

    /// Mark the socket closed and leave the registry
    pub fn finish(&mut self) {
        self.guard.unsubscribe();
        self.subscription = SubscriptionState::Unsubscribed;
        self.phase = SessionPhase::Closed;
    }

    /// Check if session is open
    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Time since the last inbound frame
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_seen.elapsed()
    }

    pub fn current_inventory(&self) -> Option<&InventoryId> {
        match &self.subscription {
            SubscriptionState::Subscribed(inventory) => Some(inventory),
            SubscriptionState::Unsubscribed => None,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("phase", &self.phase)
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::registry::Outbound;

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000)
    }

    #[test]
    fn test_session_lifecycle() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());

        assert!(session.is_open());
        assert_eq!(session.subscription, SubscriptionState::Unsubscribed);

        let reply = session.handle_text(r#"{"type":"subscribe","uuid":"u1"}"#);
        assert_eq!(reply, Some(ServerMessage::subscribed("u1")));
        assert_eq!(session.current_inventory(), Some(&InventoryId::new("u1")));

        session.close();
        assert_eq!(session.phase, SessionPhase::Closing);

        session.finish();
        assert_eq!(session.phase, SessionPhase::Closed);
        assert!(registry.subscribers_of(&InventoryId::new("u1")).is_empty());
    }

    #[test]
    fn test_switch_subscription() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());

        session.handle_text(r#"{"type":"subscribe","uuid":"a"}"#);
        let reply = session.handle_text(r#"{"type":"subscribe","uuid":"b"}"#);

        assert_eq!(reply, Some(ServerMessage::subscribed("b")));
        assert!(registry.subscribers_of(&InventoryId::new("a")).is_empty());
        assert_eq!(registry.subscribers_of(&InventoryId::new("b")).len(), 1);
    }

    #[test]
    fn test_repeat_subscribe_no_duplicate_confirmation() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());

        assert!(session
            .handle_text(r#"{"type":"subscribe","uuid":"a"}"#)
            .is_some());
        assert!(session
            .handle_text(r#"{"type":"subscribe","uuid":"a"}"#)
            .is_none());
        assert_eq!(registry.subscribers_of(&InventoryId::new("a")).len(), 1);
    }

    #[test]
    fn test_malformed_frame_dropped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());

        assert!(session.handle_text("{not json").is_none());
        assert!(session.handle_text(r#"{"type":"dance"}"#).is_none());

        assert!(session.is_open());
        assert_eq!(session.malformed_messages, 2);
        assert_eq!(session.messages_received, 0);
        assert_eq!(session.subscription, SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_eviction_transitions() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, mut rx) = Session::open(Arc::clone(&registry), 1, addr());
        session.handle_text(r#"{"type":"subscribe","uuid":"u2"}"#);

        registry.evict_inventory(&InventoryId::new("u2"));
        assert_eq!(rx.next().await, Some(Outbound::Evicted));

        session.on_evicted();
        assert_eq!(session.subscription, SubscriptionState::Unsubscribed);
        assert_eq!(session.phase, SessionPhase::Closing);
    }

    #[test]
    fn test_subscribe_uses_canonical_key() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());
        let upper = "3F2B8C1A-9D4E-4F6A-8B7C-1D2E3F4A5B6C";
        let lower = "3f2b8c1a-9d4e-4f6a-8b7c-1d2e3f4a5b6c";

        let reply = session.handle_text(&format!(r#"{{"type":"subscribe","uuid":"{upper}"}}"#));
        assert_eq!(reply, Some(ServerMessage::subscribed(upper)));
        assert_eq!(registry.subscribers_of(&InventoryId::new(lower)).len(), 1);
        assert!(registry.subscribers_of(&InventoryId::new(upper)).is_empty());

        // Same inventory, different spelling
        let reply = session.handle_text(&format!(r#"{{"type":"subscribe","uuid":"{lower}"}}"#));
        assert!(reply.is_none());
    }

    #[test]
    fn test_subscribe_after_eviction_ignored() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());
        session.handle_text(r#"{"type":"subscribe","uuid":"u2"}"#);

        registry.evict_inventory(&InventoryId::new("u2"));

        // Arrives before the connection task has handled the eviction
        assert!(session
            .handle_text(r#"{"type":"subscribe","uuid":"u2"}"#)
            .is_none());
        assert!(session
            .handle_text(r#"{"type":"subscribe","uuid":"u3"}"#)
            .is_none());
        assert_eq!(registry.inventory_count(), 0);
        assert_eq!(registry.current_subscription(1), None);
    }

    #[test]
    fn test_drop_leaves_registry_clean() {
        let registry = Arc::new(ConnectionRegistry::new());
        {
            let (mut session, _rx) = Session::open(Arc::clone(&registry), 1, addr());
            session.handle_text(r#"{"type":"subscribe","uuid":"a"}"#);
        }
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.inventory_count(), 0);
    }
}
