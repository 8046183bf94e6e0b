//! Command table and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use huddle_core::Envelope;
use huddle_core::envelope::UNKNOWN_COMMAND;
use metrics::counter;
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use super::context::CommandContext;
use super::errors::{CommandError, RegistryError};
use crate::metrics::{COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};
use crate::websocket::connection::Connection;

/// Trait implemented by every command handler.
///
/// Handlers run inline on the connection's read-loop. Storage writes go
/// through [`CommandContext::spawn_mutation`]; feeds go through
/// [`spawn_subscription`](crate::websocket::feed_bridge::spawn_subscription).
///
/// Reads whose result is the reply (identity lookup and signup insert,
/// channel search) are awaited inline. A slow store therefore delays the
/// next command on that connection only, and replies stay in command order.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute the handler with the envelope payload.
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError>;
}

/// Maps envelope names to handlers.
///
/// Built once at startup, then shared read-only behind an `Arc`.
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under `name`.
    pub fn register(
        &mut self,
        name: &str,
        handler: impl CommandHandler + 'static,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_owned()));
        }
        let _ = self.handlers.insert(name.to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Route one inbound envelope.
    ///
    /// Unknown names and handler failures are reported to the client as a
    /// single `error` envelope; the error is also returned for the caller's
    /// bookkeeping. The connection stays open either way.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        conn: &Arc<Connection>,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let Envelope { name, data } = envelope;
        let span = info_span!("command", conn_id = %conn.id, command = %name);

        async {
            let Some(handler) = self.handlers.get(&name) else {
                counter!(COMMAND_ERRORS_TOTAL, "command" => "unknown", "error_type" => "unknown_command")
                    .increment(1);
                debug!("unknown command");
                let _ = conn.send_error(UNKNOWN_COMMAND).await;
                return Err(CommandError::UnknownCommand(name.clone()));
            };

            counter!(COMMANDS_TOTAL, "command" => name.clone()).increment(1);
            match handler.handle(conn, data, ctx).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    counter!(COMMAND_ERRORS_TOTAL, "command" => name.clone(), "error_type" => err.error_type())
                        .increment(1);
                    warn!(error = %err, "command failed");
                    let _ = conn.send_error(err.to_string()).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// All registered command names (sorted).
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` has a handler.
    pub fn has_command(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
