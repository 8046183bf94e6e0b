//! Full-text search collaborator contract and an in-memory index.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{Result, StoreError};

/// Single-term query against one document field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermQuery {
    /// Field to match.
    pub field: String,
    /// Exact token to look for.
    pub term: String,
}

impl TermQuery {
    /// Build a term query.
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            term: term.into(),
        }
    }
}

/// One search result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Relevance score; higher is better.
    pub score: f64,
    /// Indexed document body.
    pub source: Value,
}

/// Full-text search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index (or replace) `doc` under `id` in `collection`.
    async fn index(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Run a term query. Hits are ordered by descending score, then id.
    async fn search(&self, collection: &str, query: &TermQuery) -> Result<Vec<SearchHit>>;
}

/// Lowercase alphanumeric tokens of a text field.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Process-local search index.
///
/// Scores are raw term frequency in the queried field. Searching a
/// collection that was never written returns no hits.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.lock().get(collection).map_or(0, BTreeMap::len)
    }

    /// Whether `collection` has no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn index(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        if !doc.is_object() {
            return Err(StoreError::InvalidRecord(format!(
                "search document {id} is not an object"
            )));
        }
        let _ = self
            .collections
            .lock()
            .entry(collection.to_owned())
            .or_default()
            .insert(id.to_owned(), doc);
        Ok(())
    }

    async fn search(&self, collection: &str, query: &TermQuery) -> Result<Vec<SearchHit>> {
        let term = query.term.to_lowercase();
        let collections = self.collections.lock();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter_map(|(id, doc)| {
                let text = doc.get(&query.field)?.as_str()?;
                let freq = tokens(text).filter(|t| *t == term).count();
                (freq > 0).then(|| SearchHit {
                    id: id.clone(),
                    score: f64::from(u32::try_from(freq).unwrap_or(u32::MAX)),
                    source: doc.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> MemoryIndex {
        let idx = MemoryIndex::new();
        idx.index("channels", "c1", json!({"name": "rust", "purpose": "Rust talk"}))
            .await
            .unwrap();
        idx.index("channels", "c2", json!({"name": "go", "purpose": "go and more go"}))
            .await
            .unwrap();
        idx.index("channels", "c3", json!({"name": "misc", "purpose": "rust, go, rust"}))
            .await
            .unwrap();
        idx
    }

    #[tokio::test]
    async fn term_matches_case_insensitively() {
        let idx = seeded().await;
        let hits = idx
            .search("channels", &TermQuery::new("purpose", "RUST"))
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["c3", "c1"]);
        assert!((hits[0].score - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn ties_break_by_id() {
        let idx = MemoryIndex::new();
        for id in ["b", "a"] {
            idx.index("c", id, json!({"purpose": "x"})).await.unwrap();
        }
        let hits = idx.search("c", &TermQuery::new("purpose", "x")).await.unwrap();
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn term_is_a_whole_token() {
        let idx = seeded().await;
        let hits = idx
            .search("channels", &TermQuery::new("purpose", "ru"))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let idx = MemoryIndex::new();
        let hits = idx
            .search("nothing", &TermQuery::new("purpose", "x"))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn reindex_replaces_document() {
        let idx = seeded().await;
        idx.index("channels", "c1", json!({"purpose": "cooking"}))
            .await
            .unwrap();
        assert_eq!(idx.len("channels"), 3);
        let hits = idx
            .search("channels", &TermQuery::new("purpose", "cooking"))
            .await
            .unwrap();
        assert_eq!(hits[0].source["purpose"], "cooking");
    }

    #[tokio::test]
    async fn rejects_non_object_documents() {
        let idx = MemoryIndex::new();
        assert!(idx.index("c", "1", json!([1, 2])).await.is_err());
        assert!(idx.is_empty("c"));
    }
}
