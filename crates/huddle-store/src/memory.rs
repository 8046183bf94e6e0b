//! In-memory [`Store`] with broadcast-backed change feeds.
//!
//! Every mutation publishes a [`TableChange`] on a single broadcast channel
//! while the table lock is held. `watch` subscribes and snapshots under the
//! same lock, so a feed sees each row exactly once: either in the initial
//! snapshot or as a later change, never both and never neither.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use huddle_core::ChangeEvent;
use huddle_core::ids::RecordId;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::errors::{Result, StoreError};
use crate::feed::ChangeFeed;
use crate::query::{Predicate, Query};
use crate::store::Store;

/// Default number of changes a slow feed may fall behind before lagging.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// One committed mutation.
#[derive(Clone, Debug)]
struct TableChange {
    table: String,
    old: Option<Value>,
    new: Option<Value>,
}

type Table = BTreeMap<String, Value>;

/// A process-local table store.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    changes: broadcast::Sender<Arc<TableChange>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create an empty store whose feeds buffer `capacity` changes.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            tables: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Number of rows in `table`.
    pub fn len(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, BTreeMap::len)
    }

    /// Whether `table` has no rows.
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Fetch a single row.
    pub fn get(&self, table: &str, key: &str) -> Option<Value> {
        self.tables.lock().get(table)?.get(key).cloned()
    }

    fn publish(&self, table: &str, old: Option<Value>, new: Option<Value>) {
        // send fails only when no feed is open
        let _ = self.changes.send(Arc::new(TableChange {
            table: table.to_owned(),
            old,
            new,
        }));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn as_object(record: Value) -> Result<Map<String, Value>> {
    match record {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidRecord(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, table: &str, record: Value) -> Result<String> {
        let mut map = as_object(record)?;
        let key = match map.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            None | Some(Value::Null | Value::String(_)) => RecordId::new().into_inner(),
            Some(other) => {
                return Err(StoreError::InvalidRecord(format!("non-string id {other}")));
            }
        };
        let _ = map.insert("id".into(), Value::String(key.clone()));
        let record = Value::Object(map);

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_owned()).or_default();
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict {
                table: table.to_owned(),
                key,
            });
        }
        let _ = rows.insert(key.clone(), record.clone());
        self.publish(table, None, Some(record));
        debug!(table, key = %key, "record inserted");
        Ok(key)
    }

    async fn update(&self, table: &str, key: &str, patch: Value) -> Result<()> {
        let patch = as_object(patch)?;
        let mut tables = self.tables.lock();
        let Some(current) = tables.get_mut(table).and_then(|rows| rows.get_mut(key)) else {
            return Err(StoreError::NotFound {
                table: table.to_owned(),
                key: key.to_owned(),
            });
        };
        let old = current.clone();
        if let Value::Object(fields) = current {
            for (field, value) in patch {
                // the key is immutable
                if field != "id" {
                    let _ = fields.insert(field, value);
                }
            }
        }
        let new = current.clone();
        if new != old {
            self.publish(table, Some(old), Some(new));
        }
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        if let Some(old) = tables.get_mut(table).and_then(|rows| rows.remove(key)) {
            self.publish(table, Some(old), None);
        }
        Ok(())
    }

    async fn filter(&self, table: &str, predicate: Predicate) -> Result<Vec<Value>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|r| predicate.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn watch(&self, query: Query, include_initial: bool) -> Result<Box<dyn ChangeFeed>> {
        let tables = self.tables.lock();
        let rx = self.changes.subscribe();
        let initial: VecDeque<Value> = if include_initial {
            tables
                .get(&query.table)
                .map(|rows| query.shape(rows.values().cloned()).into())
                .unwrap_or_default()
        } else {
            VecDeque::new()
        };
        drop(tables);

        debug!(table = %query.table, initial = initial.len(), "feed opened");
        Ok(Box::new(MemoryFeed {
            query,
            initial,
            rx,
            closed: false,
        }))
    }
}

/// Feed over a [`MemoryStore`] table.
struct MemoryFeed {
    query: Query,
    initial: VecDeque<Value>,
    rx: broadcast::Receiver<Arc<TableChange>>,
    closed: bool,
}

impl MemoryFeed {
    /// Project a committed change through the query filter.
    ///
    /// A row leaving the filter is a removal, a row entering it is an
    /// addition, and a change invisible on both sides is dropped.
    fn project(&self, change: &TableChange) -> Option<ChangeEvent> {
        if change.table != self.query.table {
            return None;
        }
        let old = change.old.clone().filter(|r| self.query.matches(r));
        let new = change.new.clone().filter(|r| self.query.matches(r));
        let event = ChangeEvent {
            new_val: new,
            old_val: old,
        };
        event.kind().map(|_| event)
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        if self.closed {
            return None;
        }
        if let Some(row) = self.initial.pop_front() {
            return Some(Ok(ChangeEvent::created(row)));
        }
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if let Some(event) = self.project(&change) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(table = %self.query.table, skipped, "change feed lagged");
                    return Some(Err(StoreError::Lagged(skipped)));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.initial.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
