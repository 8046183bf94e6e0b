//! Feed bridge: turns a change-feed cursor into classified envelopes on a
//! connection's outbound queue.

use std::future::Future;
use std::sync::Arc;

use huddle_store::{ChangeFeed, StoreError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, instrument, warn};

use super::connection::Connection;
use super::subscriptions::{Registration, SubscriptionKey};

/// Why a bridge stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeExit {
    /// The subscription token fired.
    Cancelled,
    /// The feed ended on its own.
    FeedEnded,
    /// The feed (or opening it) failed with this message.
    FeedError(String),
}

/// Forward events from `feed` to `conn` until cancelled, ended, or failed.
///
/// Every await races `token`, so a slow outbound queue cannot hold the
/// bridge past cancellation. The cursor is closed exactly once on every
/// exit path.
#[instrument(skip_all, fields(conn_id = %conn.id, label = %label))]
pub async fn run_bridge(
    mut feed: Box<dyn ChangeFeed>,
    label: &str,
    conn: &Connection,
    token: &CancellationToken,
) -> BridgeExit {
    let exit = loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break BridgeExit::Cancelled,
            next = feed.next() => next,
        };

        match next {
            None => break BridgeExit::FeedEnded,
            Some(Err(err)) => {
                let message = err.to_string();
                warn!(error = %message, "change feed failed");
                tokio::select! {
                    biased;
                    () = token.cancelled() => {}
                    _ = conn.send_error(message.clone()) => {}
                }
                break BridgeExit::FeedError(message);
            }
            Some(Ok(event)) => {
                let Some(envelope) = event.into_envelope(label) else {
                    debug!("skipping change event with neither side set");
                    continue;
                };
                tokio::select! {
                    biased;
                    () = token.cancelled() => break BridgeExit::Cancelled,
                    _ = conn.send(envelope) => {}
                }
            }
        }
    };

    feed.close().await;
    exit
}

/// Register `key` on `conn` and spawn its bridge task.
///
/// The task first waits for the listener previously holding `key` to close
/// its cursor, so two cursors for one key are never open at once. It then
/// opens the feed; if the subscription was cancelled while opening, the
/// fresh cursor is closed without forwarding anything. On exit the task
/// removes its own registry entry unless a newer one has replaced it.
pub fn spawn_subscription<F, Fut>(
    conn: &Arc<Connection>,
    key: SubscriptionKey,
    label: &'static str,
    open: F,
) -> JoinHandle<BridgeExit>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Box<dyn ChangeFeed>, StoreError>> + Send + 'static,
{
    let Registration {
        generation,
        token,
        prior,
        guard,
        ..
    } = conn.subscriptions().register(key);
    let conn = Arc::clone(conn);
    let span = info_span!("subscription", conn_id = %conn.id, %key, generation);

    tokio::spawn(
        async move {
            // Fires our completion signal once everything below is done.
            let _guard = guard;

            if let Some(prior) = prior {
                prior.cancelled().await;
            }

            let exit = if token.is_cancelled() {
                BridgeExit::Cancelled
            } else {
                match open().await {
                    Ok(mut feed) => {
                        if token.is_cancelled() {
                            feed.close().await;
                            BridgeExit::Cancelled
                        } else {
                            run_bridge(feed, label, &conn, &token).await
                        }
                    }
                    Err(err) => {
                        let message = err.to_string();
                        warn!(error = %message, "failed to open change feed");
                        let _ = conn.send_error(message.clone()).await;
                        BridgeExit::FeedError(message)
                    }
                }
            };

            let _ = conn.subscriptions().deregister(key, generation);
            debug!(?exit, "subscription ended");
            exit
        }
        .instrument(span),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
