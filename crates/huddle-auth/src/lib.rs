//! # huddle-auth
//!
//! Third-party login for Huddle.
//!
//! - [`IdentityProvider`]: authorization URL, code exchange, profile fetch
//! - [`GoogleProvider`]: Google OAuth2 over `reqwest`
//! - [`random_state`]: anti-forgery token for the authorization round trip

#![deny(unsafe_code)]

pub mod errors;
pub mod google;
pub mod provider;
pub mod state;
pub mod types;

pub use errors::AuthError;
pub use google::GoogleProvider;
pub use provider::IdentityProvider;
pub use state::{random_state, verify_state};
pub use types::{OAuthConfig, Profile};
