//! OAuth login round trip: `GET /login` and `GET /callback`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Redirect, Response};
use huddle_auth::{IdentityProvider, random_state, verify_state};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where a failed callback sends the browser.
pub const LOGIN_PATH: &str = "/login";

/// Provider plus the anti-forgery state issued by this process.
#[derive(Clone)]
pub struct AuthState {
    /// Identity provider used for the round trip.
    pub provider: Arc<dyn IdentityProvider>,
    /// State token embedded in every authorization URL.
    pub oauth_state: Arc<str>,
}

impl AuthState {
    /// Wrap `provider` with a freshly generated state token.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            oauth_state: random_state().into(),
        }
    }
}

/// `GET /login` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginUrl {
    /// Provider consent URL.
    pub url: String,
}

/// `GET /callback` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallbackParams {
    /// Echoed state token.
    pub state: String,
    /// Authorization code.
    pub code: String,
}

/// GET /login
pub async fn login(State(auth): State<AuthState>) -> Json<LoginUrl> {
    Json(LoginUrl {
        url: auth.provider.authorization_url(&auth.oauth_state),
    })
}

/// GET /callback
///
/// Any failure sends the browser back to [`LOGIN_PATH`]; success returns
/// the provider's raw profile JSON.
pub async fn callback(
    State(auth): State<AuthState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if !verify_state(&auth.oauth_state, &params.state) {
        warn!("oauth callback with invalid state");
        return Redirect::temporary(LOGIN_PATH).into_response();
    }

    let token = match auth.provider.exchange(&params.code).await {
        Ok(token) => token,
        Err(err) => {
            warn!(error = %err, "oauth code exchange failed");
            return Redirect::temporary(LOGIN_PATH).into_response();
        }
    };

    match auth.provider.fetch_profile(&token).await {
        Ok(profile) => {
            info!(external_id = %profile.external_id, "oauth login completed");
            Json(profile.raw).into_response()
        }
        Err(err) => {
            warn!(error = %err, "oauth profile fetch failed");
            Redirect::temporary(LOGIN_PATH).into_response()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
