//! Auth error types.

/// Errors that can occur during the login round trip.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider rejected a token exchange or profile request.
    #[error("OAuth error ({status}): {message}")]
    OAuth {
        /// HTTP status code.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// The provider returned a profile without an account id.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// Client credentials are missing.
    #[error("identity provider not configured: {0}")]
    NotConfigured(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
