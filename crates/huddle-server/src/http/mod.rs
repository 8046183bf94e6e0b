//! Plain HTTP endpoints.

pub mod auth;
