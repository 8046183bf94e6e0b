//! Shared dependencies for command handlers.

use std::future::Future;
use std::sync::Arc;

use huddle_store::{SearchIndex, Store};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info_span, warn};

use super::errors::CommandError;
use crate::websocket::connection::Connection;

/// Collaborators every handler can reach.
///
/// Shared by all connections; handlers never hold per-connection state here.
pub struct CommandContext {
    /// Record storage and change feeds.
    pub store: Arc<dyn Store>,
    /// Full-text search index.
    pub search: Arc<dyn SearchIndex>,
    /// Background mutations, awaited on graceful shutdown.
    pub tasks: TaskTracker,
}

impl CommandContext {
    /// Build a context over the given collaborators.
    pub fn new(store: Arc<dyn Store>, search: Arc<dyn SearchIndex>) -> Self {
        Self {
            store,
            search,
            tasks: TaskTracker::new(),
        }
    }

    /// Run a storage mutation in the background.
    ///
    /// The caller returns immediately; a failure is reported to `conn` as an
    /// `error` envelope.
    pub fn spawn_mutation<Fut>(&self, conn: &Arc<Connection>, op: &'static str, fut: Fut)
    where
        Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
    {
        let conn = Arc::clone(conn);
        let span = info_span!("mutation", conn_id = %conn.id, op);
        let _ = self.tasks.spawn(
            async move {
                if let Err(err) = fut.await {
                    warn!(error = %err, "background mutation failed");
                    let _ = conn.send_error(err.to_string()).await;
                }
            }
            .instrument(span),
        );
    }

    /// Wait for every background mutation started so far.
    #[cfg(test)]
    pub(crate) async fn settle(&self) {
        let _ = self.tasks.close();
        self.tasks.wait().await;
        let _ = self.tasks.reopen();
    }
}
