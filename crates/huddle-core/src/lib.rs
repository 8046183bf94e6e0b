//! # huddle-core
//!
//! Foundation types shared by every Huddle crate:
//!
//! - [`envelope`]: the `{ name, data }` wire unit used in both directions
//! - [`change`]: storage change events and their `add`/`remove`/`edit` classification
//! - [`models`]: user, channel, and message payload shapes
//! - [`ids`]: branded ID newtypes
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod change;
pub mod envelope;
pub mod ids;
pub mod logging;
pub mod models;

pub use change::{ChangeEvent, ChangeKind};
pub use envelope::{Envelope, EnvelopeError};
pub use ids::ConnectionId;
