//! Google OAuth2 identity provider.
//!
//! Authorization-code flow with offline access. The token exchange posts a
//! form to the token endpoint; the profile comes from the v2 userinfo
//! endpoint using the access token as a bearer credential.

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::AuthError;
use crate::provider::IdentityProvider;
use crate::types::{OAuthConfig, Profile, TokenResponse};

fn encode(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

/// Google login over `reqwest`.
pub struct GoogleProvider {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    /// Create a provider with a fresh HTTP client.
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a provider reusing an existing HTTP client.
    pub fn with_client(config: OAuthConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Provider configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }
}

/// Build a [`Profile`] from a userinfo response.
fn parse_profile(raw: Value) -> Result<Profile, AuthError> {
    let field = |name: &str| {
        raw.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let external_id = field("id");
    if external_id.is_empty() {
        return Err(AuthError::InvalidProfile("missing account id".into()));
    }
    Ok(Profile {
        external_id,
        name: field("name"),
        email: field("email"),
        avatar_url: field("picture"),
        raw,
    })
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?access_type=offline&client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.auth_url,
            encode(&self.config.client_id),
            encode(&self.config.redirect_url),
            encode(&self.config.scopes.join(" ")),
            encode(state),
        )
    }

    #[instrument(skip_all)]
    async fn exchange(&self, code: &str) -> Result<String, AuthError> {
        if !self.config.is_configured() {
            return Err(AuthError::NotConfigured("google client credentials".into()));
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AuthError::OAuth { status, message });
        }

        let data: TokenResponse = resp.json().await?;
        debug!("authorization code exchanged");
        Ok(data.access_token)
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, AuthError> {
        let resp = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AuthError::OAuth { status, message });
        }

        let raw: Value = resp.json().await?;
        parse_profile(raw)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
