//! Server configuration.

use std::time::Duration;

use huddle_settings::ServerSettings;

/// Configuration for the Huddle server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// `WebSocket` upgrade path.
    pub ws_path: String,
    /// Per-connection outbound queue capacity.
    pub outbound_queue: usize,
    /// How long an enqueue may wait for space before the envelope is dropped.
    pub send_timeout: Duration,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Close the session after this long without a pong.
    pub pong_timeout: Duration,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/chat".into(),
            outbound_queue: 256,
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            ws_path: s.ws_path.clone(),
            outbound_queue: s.outbound_queue,
            send_timeout: s.send_timeout(),
            ping_interval: s.ping_interval(),
            pong_timeout: s.pong_timeout(),
            max_message_size: s.max_message_size,
        }
    }
}
