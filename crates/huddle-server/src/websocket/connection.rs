//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use huddle_core::models::User;
use huddle_core::{ConnectionId, Envelope};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

use super::subscriptions::SubscriptionRegistry;
use crate::metrics::OUTBOUND_DROPS_TOTAL;

/// A connected client.
///
/// Handlers and feed bridges never touch the transport: they enqueue
/// envelopes with [`send`](Self::send) and the session's writer pump is the
/// only consumer.
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send side of the outbound queue.
    tx: mpsc::Sender<Envelope>,
    /// Longest an enqueue may wait for queue space.
    send_timeout: Duration,
    /// Authenticated user, set by the identity commands.
    user: Mutex<Option<User>>,
    /// Live feed subscriptions.
    subscriptions: SubscriptionRegistry,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last ping check.
    is_alive: AtomicBool,
    /// When the last frame was received.
    last_seen: Mutex<Instant>,
    /// Envelopes dropped on a full or closed queue.
    dropped: AtomicU64,
}

impl Connection {
    /// Create a connection around the send side of its outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Envelope>, send_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            send_timeout,
            user: Mutex::new(None),
            subscriptions: SubscriptionRegistry::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an envelope for delivery.
    ///
    /// Waits up to the send timeout for queue space. On timeout, or when the
    /// pump is gone, the envelope is dropped and `false` is returned.
    pub async fn send(&self, envelope: Envelope) -> bool {
        match self.tx.send_timeout(envelope, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(env)) => {
                self.record_drop();
                warn!(conn_id = %self.id, name = %env.name, "outbound queue full, dropping envelope");
                false
            }
            Err(SendTimeoutError::Closed(env)) => {
                self.record_drop();
                debug!(conn_id = %self.id, name = %env.name, "connection closed, dropping envelope");
                false
            }
        }
    }

    /// Enqueue an `error` envelope.
    pub async fn send_error(&self, message: impl Into<String>) -> bool {
        self.send(Envelope::error(message)).await
    }

    fn record_drop(&self) {
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!(OUTBOUND_DROPS_TOTAL).increment(1);
    }

    /// Total envelopes dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the writer pump has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Subscription registry of this connection.
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Replace the authenticated-user snapshot.
    pub fn set_user(&self, user: User) {
        *self.user.lock() = Some(user);
    }

    /// Snapshot of the authenticated user.
    pub fn user(&self) -> Option<User> {
        self.user.lock().clone()
    }

    /// Id of the authenticated user.
    pub fn user_id(&self) -> Option<String> {
        self.user.lock().as_ref().and_then(|u| u.id.clone())
    }

    /// Apply `f` to the user snapshot in place, if one is set.
    pub fn update_user(&self, f: impl FnOnce(&mut User)) -> bool {
        match self.user.lock().as_mut() {
            Some(user) => {
                f(user);
                true
            }
            None => false,
        }
    }

    /// Mark the connection as alive (any frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last received frame (or connection establishment).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Count of live connections, shared with the health endpoint.
#[derive(Clone, Default)]
pub struct LiveConnections(Arc<AtomicUsize>);

impl LiveConnections {
    /// Create a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one connection until the returned guard drops.
    pub fn enter(&self) -> LiveGuard {
        let _ = self.0.fetch_add(1, Ordering::Relaxed);
        LiveGuard(self.0.clone())
    }

    /// Current number of connections.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decrements [`LiveConnections`] on drop.
pub struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
