//! # huddle-server
//!
//! Axum HTTP + `WebSocket` server for Huddle.
//!
//! - `WebSocket` gateway: one read-loop and one writer pump per connection
//! - Command registry: demultiplexes `{ name, data }` envelopes to handlers
//! - Subscription registry: at most one live feed listener per key per connection
//! - Feed bridge: turns storage change events into `add`/`remove`/`edit` envelopes
//! - HTTP endpoints: OAuth login/callback, health, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod command;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
