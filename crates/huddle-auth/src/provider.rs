//! Identity-provider contract.

use async_trait::async_trait;

use crate::errors::AuthError;
use crate::types::Profile;

/// An OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser visits to grant consent. `state` is echoed back to
    /// the callback unchanged.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for an access token.
    async fn exchange(&self, code: &str) -> Result<String, AuthError>;

    /// Fetch the account profile for an access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AuthError>;
}
