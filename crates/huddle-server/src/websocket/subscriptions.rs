//! Per-connection subscription registry.
//!
//! Maps each [`SubscriptionKey`] to at most one live listener. Registering a
//! key cancels the listener already holding it and hands the newcomer that
//! listener's completion signal, so the newcomer can wait for the old cursor
//! to close before opening its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::metrics::SUBSCRIPTIONS_ACTIVE;

/// Resource classes a connection can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// Every channel.
    ChannelList,
    /// Every user.
    UserList,
    /// Messages of one channel.
    ChannelMessages,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChannelList => "channel_list",
            Self::UserList => "user_list",
            Self::ChannelMessages => "channel_messages",
        })
    }
}

struct Entry {
    token: CancellationToken,
    generation: u64,
    done: CancellationToken,
}

/// A freshly installed subscription slot.
///
/// The listener task takes ownership: `guard` fires the completion signal
/// when dropped, which must happen only after the listener's cursor is
/// closed.
pub struct Registration {
    /// Key this registration holds.
    pub key: SubscriptionKey,
    /// Generation used for self-deregistration.
    pub generation: u64,
    /// Cancelled on unsubscribe, resubscribe, or teardown.
    pub token: CancellationToken,
    /// Completion signal of the listener that held the key before.
    pub prior: Option<CancellationToken>,
    /// Fires this registration's completion signal on drop.
    pub guard: DropGuard,
}

/// Live subscriptions of one connection.
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<SubscriptionKey, Entry>>,
    next_generation: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Install a fresh subscription under `key`, cancelling any existing one.
    pub fn register(&self, key: SubscriptionKey) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let done = CancellationToken::new();
        let guard = done.clone().drop_guard();

        let previous = self.entries.lock().insert(
            key,
            Entry {
                token: token.clone(),
                generation,
                done,
            },
        );

        let prior = match previous {
            Some(old) => {
                old.token.cancel();
                debug!(%key, replaced = old.generation, generation, "subscription replaced");
                Some(old.done)
            }
            None => {
                gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
                None
            }
        };

        Registration {
            key,
            generation,
            token,
            prior,
            guard,
        }
    }

    /// Cancel and remove the subscription under `key`, if any.
    pub fn cancel(&self, key: SubscriptionKey) -> bool {
        let removed = self.entries.lock().remove(&key);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
                true
            }
            None => false,
        }
    }

    /// Cancel and remove every subscription.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.token.cancel();
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
        }
        drained.len()
    }

    /// Remove `key` only if it is still held by `generation`.
    ///
    /// Called by a listener on exit so a newer registration under the same
    /// key is never disturbed.
    pub fn deregister(&self, key: SubscriptionKey, generation: u64) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(&key).is_some_and(|e| e.generation == generation) {
            let _ = entries.remove(&key);
            gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
            true
        } else {
            false
        }
    }

    /// Whether a listener currently holds `key`.
    pub fn is_active(&self, key: SubscriptionKey) -> bool {
        self.entries.lock().contains_key(&key)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no subscription is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
