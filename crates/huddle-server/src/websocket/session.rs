//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use huddle_core::{ConnectionId, Envelope};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, LiveConnections};
use super::frame::Frame;
use super::handler::handle_frame;
use crate::command::context::CommandContext;
use crate::command::registry::CommandRegistry;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Reply to a binary frame that is not UTF-8 text.
pub const NON_UTF8_FRAME: &str = "invalid envelope: frame is not valid UTF-8";

/// Everything a session shares with the rest of the server.
#[derive(Clone)]
pub struct SessionShared {
    /// Frozen command table.
    pub registry: Arc<CommandRegistry>,
    /// Handler collaborators.
    pub ctx: Arc<CommandContext>,
    /// Queue sizes and keepalive timings.
    pub config: Arc<ServerConfig>,
    /// Server-wide shutdown signal; each session derives a child.
    pub shutdown: CancellationToken,
    /// Live connection count for `/health`.
    pub live: LiveConnections,
}

/// Run a session over an upgraded axum socket.
pub async fn serve_socket(socket: WebSocket, shared: SessionShared) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    let stream = stream.map(|msg| msg.map(Frame::from));
    run_session(stream, sink, &shared).await;
}

/// Run a session for one client.
///
/// 1. Creates the [`Connection`] and starts its single writer pump
/// 2. Decodes inbound text frames and dispatches them inline, in order
/// 3. Ends on close, transport error, keepalive timeout, or server shutdown
/// 4. Cancels every subscription, then stops the pump
#[instrument(skip_all, name = "ws_session")]
pub async fn run_session<S, K, E>(mut stream: S, sink: K, shared: &SessionShared)
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    K: Sink<Frame> + Unpin + Send + 'static,
    E: Display,
{
    let (tx, rx) = mpsc::channel(shared.config.outbound_queue.max(1));
    let conn = Arc::new(Connection::new(ConnectionId::new(), tx, shared.config.send_timeout));
    let session = shared.shutdown.child_token();
    let _live = shared.live.enter();

    let started = Instant::now();
    info!(conn_id = %conn.id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let pump = tokio::spawn(write_pump(
        sink,
        rx,
        Arc::clone(&conn),
        session.clone(),
        shared.config.ping_interval,
        shared.config.pong_timeout,
    ));

    loop {
        let frame = tokio::select! {
            biased;
            () = session.cancelled() => break,
            frame = stream.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                debug!(conn_id = %conn.id, error = %err, "transport error");
                break;
            }
            None => break,
        };

        conn.mark_alive();
        match frame {
            Frame::Text(text) => handle_frame(&text, &conn, &shared.registry, &shared.ctx).await,
            Frame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => handle_frame(&text, &conn, &shared.registry, &shared.ctx).await,
                Err(err) => {
                    debug!(conn_id = %conn.id, len = err.as_bytes().len(), "rejecting non-UTF-8 binary frame");
                    let _ = conn.send_error(NON_UTF8_FRAME).await;
                }
            },
            Frame::Close => {
                info!(conn_id = %conn.id, "client sent close frame");
                break;
            }
            Frame::Ping(_) | Frame::Pong(_) => {}
        }
    }

    let cancelled = conn.subscriptions().cancel_all();
    session.cancel();
    let _ = pump.await;

    info!(
        conn_id = %conn.id,
        subscriptions = cancelled,
        dropped = conn.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Single consumer of the outbound queue.
///
/// Also sends periodic pings and ends the session when the client has been
/// silent for longer than `pong_timeout`.
async fn write_pump<K>(
    mut sink: K,
    mut rx: mpsc::Receiver<Envelope>,
    conn: Arc<Connection>,
    stop: CancellationToken,
    ping_interval: Duration,
    pong_timeout: Duration,
) where
    K: Sink<Frame> + Unpin,
{
    // Any exit from the pump ends the read-loop too.
    let _stop = stop.clone().drop_guard();
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            msg = rx.recv() => {
                let Some(envelope) = msg else { break };
                let text = match envelope.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(conn_id = %conn.id, error = %err, "failed to encode envelope");
                        continue;
                    }
                };
                if sink.send(Frame::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if !conn.check_alive() && conn.last_seen_elapsed() > pong_timeout {
                    warn!(conn_id = %conn.id, "client unresponsive for {pong_timeout:?}, disconnecting");
                    break;
                }
                if sink.send(Frame::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use huddle_core::ChangeEvent;
    use huddle_store::{ChangeFeed, MemoryIndex, MemoryStore, Predicate, Query, Store};
    use serde_json::{Value, json};

    use crate::command::handlers::register_all;

    type Inbound = fmpsc::UnboundedSender<Result<Frame, std::io::Error>>;
    type Outbound = fmpsc::UnboundedReceiver<Frame>;

    /// Cursor counts shared by a [`CountingStore`] and its feeds.
    #[derive(Default)]
    struct CursorCounts {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl CursorCounts {
        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    /// `MemoryStore` whose feeds count every `close` call.
    struct CountingStore {
        inner: MemoryStore,
        counts: Arc<CursorCounts>,
    }

    struct CountedFeed {
        inner: Box<dyn ChangeFeed>,
        counts: Arc<CursorCounts>,
    }

    #[async_trait]
    impl ChangeFeed for CountedFeed {
        async fn next(&mut self) -> Option<huddle_store::Result<ChangeEvent>> {
            self.inner.next().await
        }

        async fn close(&mut self) {
            let _ = self.counts.closed.fetch_add(1, Ordering::SeqCst);
            self.inner.close().await;
        }
    }

    #[async_trait]
    impl Store for CountingStore {
        async fn insert(&self, table: &str, record: Value) -> huddle_store::Result<String> {
            self.inner.insert(table, record).await
        }

        async fn update(&self, table: &str, key: &str, patch: Value) -> huddle_store::Result<()> {
            self.inner.update(table, key, patch).await
        }

        async fn delete(&self, table: &str, key: &str) -> huddle_store::Result<()> {
            self.inner.delete(table, key).await
        }

        async fn filter(&self, table: &str, predicate: Predicate) -> huddle_store::Result<Vec<Value>> {
            self.inner.filter(table, predicate).await
        }

        async fn watch(
            &self,
            query: Query,
            include_initial: bool,
        ) -> huddle_store::Result<Box<dyn ChangeFeed>> {
            let inner = self.inner.watch(query, include_initial).await?;
            let _ = self.counts.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountedFeed {
                inner,
                counts: Arc::clone(&self.counts),
            }))
        }
    }

    fn make_counting_shared() -> (SessionShared, Arc<CountingStore>) {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            counts: Arc::new(CursorCounts::default()),
        });
        (shared_over(ServerConfig::default(), store.clone()), store)
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    fn make_shared(config: ServerConfig) -> (SessionShared, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (shared_over(config, store.clone()), store)
    }

    fn shared_over(config: ServerConfig, store: Arc<dyn Store>) -> SessionShared {
        let ctx = CommandContext::new(store, Arc::new(MemoryIndex::new()));
        let mut registry = CommandRegistry::new();
        register_all(&mut registry).unwrap();
        SessionShared {
            registry: Arc::new(registry),
            ctx: Arc::new(ctx),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
            live: LiveConnections::new(),
        }
    }

    fn start(shared: &SessionShared) -> (Inbound, Outbound, tokio::task::JoinHandle<()>) {
        let (in_tx, in_rx) = fmpsc::unbounded();
        let (out_tx, out_rx) = fmpsc::unbounded();
        let shared = shared.clone();
        let handle = tokio::spawn(async move { run_session(in_rx, out_tx, &shared).await });
        (in_tx, out_rx, handle)
    }

    fn command(name: &str, data: Value) -> Result<Frame, std::io::Error> {
        Ok(Frame::Text(Envelope::new(name, data).encode().unwrap()))
    }

    async fn next_envelope(out: &mut Outbound) -> Envelope {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), out.next())
                .await
                .expect("timed out waiting for frame")
                .expect("session ended");
            if let Frame::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn finish(handle: tokio::task::JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("session did not end")
            .unwrap();
    }

    #[tokio::test]
    async fn subscribe_and_receive_changes() {
        let (shared, store) = make_shared(ServerConfig::default());
        let (inbound, mut out, handle) = start(&shared);

        inbound
            .unbounded_send(command("channel subscribe", json!(null)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = store
            .insert("channel", json!({"id": "c1", "name": "general"}))
            .await
            .unwrap();

        let env = next_envelope(&mut out).await;
        assert_eq!(env, Envelope::new("channel add", json!({"id": "c1", "name": "general"})));

        inbound.unbounded_send(Ok(Frame::Close)).unwrap();
        finish(handle).await;
        assert_eq!(shared.live.count(), 0);
    }

    #[tokio::test]
    async fn binary_frames_are_decoded_as_text() {
        let (shared, _store) = make_shared(ServerConfig::default());
        let (inbound, mut out, handle) = start(&shared);

        let bytes = br#"{"name":"check login","data":{}}"#.to_vec();
        inbound.unbounded_send(Ok(Frame::Binary(bytes))).unwrap();
        inbound
            .unbounded_send(Ok(Frame::Binary(vec![0xff, 0xfe])))
            .unwrap();
        inbound
            .unbounded_send(command("nonsense", json!(null)))
            .unwrap();

        assert_eq!(next_envelope(&mut out).await.name, "check login");
        assert_eq!(next_envelope(&mut out).await, Envelope::error(NON_UTF8_FRAME));
        assert_eq!(next_envelope(&mut out).await, Envelope::error("unknown command"));

        drop(inbound);
        finish(handle).await;
    }

    #[tokio::test]
    async fn replies_follow_command_order() {
        let (shared, _store) = make_shared(ServerConfig::default());
        let (inbound, mut out, handle) = start(&shared);

        inbound
            .unbounded_send(command("google login", json!({"auth_service_id": "g-1", "name": "Ada"})))
            .unwrap();
        inbound
            .unbounded_send(command("channel search", json!({"channel": "nothing"})))
            .unwrap();
        inbound
            .unbounded_send(command("nonsense", json!(null)))
            .unwrap();

        assert_eq!(next_envelope(&mut out).await.name, "check login");
        assert_eq!(next_envelope(&mut out).await, Envelope::error("No channels found"));
        assert_eq!(next_envelope(&mut out).await, Envelope::error("unknown command"));

        drop(inbound);
        finish(handle).await;
    }

    #[tokio::test]
    async fn shutdown_ends_session() {
        let (shared, _store) = make_shared(ServerConfig::default());
        let (_inbound, _out, handle) = start(&shared);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(shared.live.count(), 1);

        shared.shutdown.cancel();
        finish(handle).await;
        assert_eq!(shared.live.count(), 0);
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let config = ServerConfig {
            ping_interval: Duration::from_millis(20),
            pong_timeout: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let (shared, _store) = make_shared(config);
        let (_inbound, out, handle) = start(&shared);

        finish(handle).await;
        let frames: Vec<Frame> = out.collect().await;
        assert!(frames.iter().any(|f| matches!(f, Frame::Ping(_))));
    }

    #[tokio::test]
    async fn close_cancels_subscriptions() {
        let (shared, store) = make_shared(ServerConfig::default());
        let (inbound, _out, handle) = start(&shared);

        inbound
            .unbounded_send(command("user subscribe", json!(null)))
            .unwrap();
        inbound
            .unbounded_send(command("message subscribe", json!({"channelId": "c1"})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        drop(inbound);
        finish(handle).await;

        // Writes after teardown have nowhere to go and must not panic.
        let _ = store.insert("user", json!({"name": "late"})).await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_command_closes_cursor_once() {
        let (shared, store) = make_counting_shared();
        let (inbound, mut out, handle) = start(&shared);

        inbound
            .unbounded_send(command("channel subscribe", json!(null)))
            .unwrap();
        wait_until(|| store.counts.opened() == 1).await;

        let _ = store
            .insert("channel", json!({"id": "c1", "name": "general"}))
            .await
            .unwrap();
        assert_eq!(
            next_envelope(&mut out).await,
            Envelope::new("channel add", json!({"id": "c1", "name": "general"}))
        );

        inbound
            .unbounded_send(command("channel unsubscribe", json!(null)))
            .unwrap();
        wait_until(|| store.counts.closed() == 1).await;

        let _ = store
            .insert("channel", json!({"id": "c2", "name": "late"}))
            .await
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(150), out.next())
                .await
                .is_err(),
            "event delivered after unsubscribe"
        );

        drop(inbound);
        finish(handle).await;
        assert_eq!(store.counts.opened(), 1);
        assert_eq!(store.counts.closed(), 1);
    }

    #[tokio::test]
    async fn disconnect_closes_cursor_once() {
        let (shared, store) = make_counting_shared();
        let (inbound, _out, handle) = start(&shared);

        inbound
            .unbounded_send(command("channel subscribe", json!(null)))
            .unwrap();
        wait_until(|| store.counts.opened() == 1).await;

        drop(inbound);
        finish(handle).await;
        wait_until(|| store.counts.closed() >= 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.counts.closed(), 1);
    }
}
