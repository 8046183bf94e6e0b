//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// `WebSocket` connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active `WebSocket` connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// `WebSocket` disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// `WebSocket` connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Commands dispatched total (counter, labels: command).
pub const COMMANDS_TOTAL: &str = "commands_total";
/// Command failures total (counter, labels: command, error_type).
pub const COMMAND_ERRORS_TOTAL: &str = "command_errors_total";
/// Live feed subscriptions across all connections (gauge).
pub const SUBSCRIPTIONS_ACTIVE: &str = "subscriptions_active";
/// Outbound envelopes dropped on a full or closed queue (counter).
pub const OUTBOUND_DROPS_TOTAL: &str = "outbound_drops_total";
