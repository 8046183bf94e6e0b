//! Settings types.
//!
//! All structs serialize as camelCase and fill missing fields from their
//! `Default` impl, so a settings file only needs the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HuddleSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Identity-provider settings.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl HuddleSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if !s.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "wsPath must start with '/', got {:?}",
                s.ws_path
            )));
        }
        if s.outbound_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "outboundQueue must be at least 1".into(),
            ));
        }
        if s.ping_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "pingIntervalMs must be positive".into(),
            ));
        }
        if s.pong_timeout_ms <= s.ping_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "pongTimeoutMs ({}) must exceed pingIntervalMs ({})",
                s.pong_timeout_ms, s.ping_interval_ms
            )));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// WebSocket upgrade path.
    pub ws_path: String,
    /// Per-connection outbound queue capacity (envelopes).
    pub outbound_queue: usize,
    /// How long an enqueue may wait for queue space before dropping.
    pub send_timeout_ms: u64,
    /// Interval between server pings.
    pub ping_interval_ms: u64,
    /// Close the session when no pong arrives for this long.
    pub pong_timeout_ms: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            ws_path: "/chat".to_string(),
            outbound_queue: 256,
            send_timeout_ms: 5_000,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 60_000,
            max_message_size: 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// `send_timeout_ms` as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// `ping_interval_ms` as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// `pong_timeout_ms` as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

/// Google OAuth2 client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Callback URL registered with the provider.
    pub redirect_url: String,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Profile endpoint.
    pub userinfo_url: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: "http://localhost:4000/callback".to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            scopes: vec![
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ],
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_documented_values() {
        let s = HuddleSettings::default();
        assert_eq!(s.server.port, 4000);
        assert_eq!(s.server.ws_path, "/chat");
        assert_eq!(s.server.outbound_queue, 256);
        assert_eq!(s.server.send_timeout(), Duration::from_secs(5));
        assert_eq!(s.server.ping_interval(), Duration::from_secs(30));
        assert_eq!(s.server.pong_timeout(), Duration::from_secs(60));
        assert_eq!(s.auth.redirect_url, "http://localhost:4000/callback");
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(HuddleSettings::default()).unwrap();
        assert_eq!(v["server"]["wsPath"], "/chat");
        assert_eq!(v["server"]["maxMessageSize"], 1_048_576);
        assert!(v["auth"].get("clientId").is_some());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: HuddleSettings = serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.logging.format, "compact");
    }

    #[test]
    fn validate_rejects_relative_ws_path() {
        let mut s = HuddleSettings::default();
        s.server.ws_path = "chat".into();
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = HuddleSettings::default();
        s.server.outbound_queue = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_pong_not_after_ping() {
        let mut s = HuddleSettings::default();
        s.server.pong_timeout_ms = s.server.ping_interval_ms;
        assert!(s.validate().is_err());
    }
}
