//! `WebSocket` gateway.
//!
//! A session owns one [`Connection`](connection::Connection): the read-loop
//! dispatches inbound envelopes, a single writer pump drains the outbound
//! queue, and feed bridges push classified change events into that queue.

pub mod connection;
pub mod feed_bridge;
pub mod frame;
pub mod handler;
pub mod session;
pub mod subscriptions;
