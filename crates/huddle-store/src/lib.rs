//! # huddle-store
//!
//! Contracts for the two external collaborators Huddle talks to, plus
//! in-memory engines that satisfy them:
//!
//! - [`Store`]: record storage with a `watch` primitive yielding a
//!   [`ChangeFeed`] of before/after pairs
//! - [`SearchIndex`]: full-text term search over indexed documents
//!
//! [`MemoryStore`] and [`MemoryIndex`] back the server binary and every test.

#![deny(unsafe_code)]

pub mod errors;
pub mod feed;
pub mod memory;
pub mod query;
pub mod search;
pub mod store;

pub use errors::{Result, StoreError};
pub use feed::{ChangeFeed, ChannelFeed};
pub use memory::MemoryStore;
pub use query::{Predicate, Query};
pub use search::{MemoryIndex, SearchHit, SearchIndex, TermQuery};
pub use store::Store;
