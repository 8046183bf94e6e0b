//! Inbound frame handling: decode, then dispatch.

use std::sync::Arc;

use huddle_core::Envelope;
use tracing::debug;

use super::connection::Connection;
use crate::command::context::CommandContext;
use crate::command::registry::CommandRegistry;

/// Decode one text frame and route it.
///
/// A frame that fails to decode produces one `error` envelope; dispatch
/// failures are reported by the registry. The connection stays usable.
pub async fn handle_frame(
    text: &str,
    conn: &Arc<Connection>,
    registry: &CommandRegistry,
    ctx: &Arc<CommandContext>,
) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(conn_id = %conn.id, error = %err, "rejecting frame");
            let _ = conn.send_error(err.to_string()).await;
            return;
        }
    };
    let _ = registry.dispatch(envelope, conn, ctx).await;
}
