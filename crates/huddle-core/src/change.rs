//! Storage change events and their classification.
//!
//! A watch cursor yields `(new_val, old_val)` pairs. Exactly one of three
//! shapes is meaningful:
//!
//! | `new_val` | `old_val` | Kind     | Forwarded payload |
//! |-----------|-----------|----------|-------------------|
//! | some      | none      | `add`    | `new_val`         |
//! | none      | some      | `remove` | `old_val`         |
//! | some      | some      | `edit`   | `new_val`         |

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;

/// One notification from a storage change feed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Record after the change (`None` for deletions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_val: Option<Value>,
    /// Record before the change (`None` for creations and initial rows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_val: Option<Value>,
}

/// Uniform verb attached to feed-originated events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A record appeared.
    Add,
    /// A record disappeared.
    Remove,
    /// A record changed in place.
    Edit,
}

impl ChangeKind {
    /// Wire verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChangeEvent {
    /// A creation (or initial-row) event.
    pub fn created(record: Value) -> Self {
        Self {
            new_val: Some(record),
            old_val: None,
        }
    }

    /// A deletion event.
    pub fn deleted(record: Value) -> Self {
        Self {
            new_val: None,
            old_val: Some(record),
        }
    }

    /// An in-place update event.
    pub fn updated(old: Value, new: Value) -> Self {
        Self {
            new_val: Some(new),
            old_val: Some(old),
        }
    }

    /// Kind of this change, or `None` when neither side is set.
    pub fn kind(&self) -> Option<ChangeKind> {
        match (&self.new_val, &self.old_val) {
            (Some(_), None) => Some(ChangeKind::Add),
            (None, Some(_)) => Some(ChangeKind::Remove),
            (Some(_), Some(_)) => Some(ChangeKind::Edit),
            (None, None) => None,
        }
    }

    /// Split into kind and forwarded payload.
    pub fn classify(self) -> Option<(ChangeKind, Value)> {
        match (self.new_val, self.old_val) {
            (Some(new), None) => Some((ChangeKind::Add, new)),
            (None, Some(old)) => Some((ChangeKind::Remove, old)),
            (Some(new), Some(_)) => Some((ChangeKind::Edit, new)),
            (None, None) => None,
        }
    }

    /// Build the outbound envelope `"<label> <verb>"`.
    pub fn into_envelope(self, label: &str) -> Option<Envelope> {
        let (kind, payload) = self.classify()?;
        Some(Envelope::new(event_name(label, kind), payload))
    }
}

/// Outbound event name for an entity label and change kind.
pub fn event_name(label: &str, kind: ChangeKind) -> String {
    format!("{label} {kind}")
}
