//! Storage collaborator contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::feed::ChangeFeed;
use crate::query::{Predicate, Query};

/// Record storage with a native watch primitive.
///
/// Records are JSON objects keyed by their `id` field. Implementations are
/// shared by every connection, so all methods take `&self`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a record, generating an `id` when absent. Returns the key.
    async fn insert(&self, table: &str, record: Value) -> Result<String>;

    /// Shallow-merge `patch` into the record stored under `key`.
    async fn update(&self, table: &str, key: &str, patch: Value) -> Result<()>;

    /// Delete the record under `key`. Deleting a missing key is a no-op.
    async fn delete(&self, table: &str, key: &str) -> Result<()>;

    /// Every record matching `predicate`.
    async fn filter(&self, table: &str, predicate: Predicate) -> Result<Vec<Value>>;

    /// Open a change feed over `query`.
    ///
    /// With `include_initial`, rows already present (filtered, ordered,
    /// and limited by `query`) are delivered first as creations.
    async fn watch(&self, query: Query, include_initial: bool) -> Result<Box<dyn ChangeFeed>>;
}
