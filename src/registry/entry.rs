//! Connection handles and subscriber sets
//!
//! A [`ConnectionHandle`] is the registry's view of one live connection: a
//! bounded outbound queue plus an eviction signal. The transport task owns
//! the matching [`ConnectionReceiver`] and drains it onto the socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

/// Why a single delivery did not reach a connection's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbound queue is full (slow or stalled reader)
    QueueFull,
    /// The connection's receiver is gone
    Closed,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::QueueFull => write!(f, "outbound queue full"),
            DeliveryError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for DeliveryError {}

struct Eviction {
    flag: AtomicBool,
    notify: Notify,
}

/// Sending side of a connection, shared with the registry
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::Sender<Bytes>,
    eviction: Arc<Eviction>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its transport task drains
    pub fn channel(id: u64, capacity: usize) -> (Self, ConnectionReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let eviction = Arc::new(Eviction {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        });

        let handle = Self {
            id,
            tx,
            eviction: Arc::clone(&eviction),
        };
        let receiver = ConnectionReceiver {
            frames: rx,
            eviction,
            evicted: false,
        };

        (handle, receiver)
    }

    /// Connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the receiving side is still alive
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Whether the connection has been evicted
    pub fn is_evicted(&self) -> bool {
        self.eviction.flag.load(Ordering::Acquire)
    }

    /// Queue a frame without waiting
    pub fn deliver(&self, frame: Bytes) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Signal the terminal eviction notice
    ///
    /// Not subject to queue capacity, so it can't be lost to a full queue.
    pub(crate) fn evict(&self) {
        self.eviction.flag.store(true, Ordering::Release);
        self.eviction.notify.notify_one();
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Next item for the transport to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized message
    Frame(Bytes),
    /// The subscribed inventory was deleted; send the notice and close
    Evicted,
}

/// Receiving side of a connection, owned by its transport task
pub struct ConnectionReceiver {
    frames: mpsc::Receiver<Bytes>,
    eviction: Arc<Eviction>,
    evicted: bool,
}

impl ConnectionReceiver {
    /// Wait for the next outbound item
    ///
    /// Frames queued before an eviction are yielded first. Returns `None`
    /// once `Evicted` has been yielded or every handle is dropped.
    pub async fn next(&mut self) -> Option<Outbound> {
        if self.evicted {
            return None;
        }

        tokio::select! {
            biased;
            frame = self.frames.recv() => match frame {
                Some(frame) => Some(Outbound::Frame(frame)),
                None => self.take_eviction(),
            },
            _ = self.eviction.notify.notified() => {
                // Drain anything that raced in ahead of the signal
                if let Ok(frame) = self.frames.try_recv() {
                    self.eviction.notify.notify_one();
                    return Some(Outbound::Frame(frame));
                }
                self.evicted = true;
                Some(Outbound::Evicted)
            }
        }
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<Outbound> {
        if self.evicted {
            return None;
        }
        if let Ok(frame) = self.frames.try_recv() {
            return Some(Outbound::Frame(frame));
        }
        self.take_eviction()
    }

    fn take_eviction(&mut self) -> Option<Outbound> {
        if self.eviction.flag.load(Ordering::Acquire) {
            self.evicted = true;
            Some(Outbound::Evicted)
        } else {
            None
        }
    }
}

/// Live connections subscribed to one inventory
///
/// Membership only: no ordering, no duplicates.
#[derive(Debug, Default)]
pub struct SubscriberSet {
    members: HashMap<u64, ConnectionHandle>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection; returns false if it was already a member
    pub fn insert(&mut self, handle: ConnectionHandle) -> bool {
        self.members.insert(handle.id(), handle).is_none()
    }

    /// Remove a connection by id
    pub fn remove(&mut self, connection_id: u64) -> Option<ConnectionHandle> {
        self.members.remove(&connection_id)
    }

    pub fn contains(&self, connection_id: u64) -> bool {
        self.members.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Copy the current members for delivery outside the lock
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.members.values().cloned().collect()
    }

    /// Take every member, leaving the set empty
    pub fn drain(&mut self) -> Vec<ConnectionHandle> {
        self.members.drain().map(|(_, handle)| handle).collect()
    }
}
