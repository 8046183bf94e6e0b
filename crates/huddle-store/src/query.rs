//! Query model for `filter` and `watch`.

use std::cmp::Ordering;

use serde_json::Value;

/// Row predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `record[field] == value`.
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
}

impl Predicate {
    /// Equality predicate on a single field.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether `record` satisfies the predicate.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Self::Eq { field, value } => record.get(field) == Some(value),
        }
    }
}

/// A table query: optional filter, ordering, and limit.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Table to read.
    pub table: String,
    /// Row filter.
    pub filter: Option<Predicate>,
    /// Ascending sort field.
    pub order_by: Option<String>,
    /// Maximum number of rows, counted back from the end of the ordering.
    pub limit: Option<usize>,
}

impl Query {
    /// Every row of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    /// Restrict to rows where `field == value`.
    #[must_use]
    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Predicate::eq(field, value));
        self
    }

    /// Sort ascending by `field`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Keep at most the last `n` rows of the ordering (the newest `n` when
    /// ordered by a creation time).
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether `record` passes the filter (always true without one).
    pub fn matches(&self, record: &Value) -> bool {
        self.filter.as_ref().is_none_or(|p| p.matches(record))
    }

    /// Apply filter, ordering, and limit to a row set.
    pub fn shape(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows.into_iter().filter(|r| self.matches(r)).collect();
        if let Some(field) = &self.order_by {
            out.sort_by(|a, b| compare_fields(a.get(field), b.get(field)));
        }
        if let Some(limit) = self.limit {
            let _ = out.drain(..out.len().saturating_sub(limit));
        }
        out
    }
}

/// Order two optional JSON values. Missing fields sort first; numbers
/// compare numerically, strings lexically, mixed kinds by kind rank.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
