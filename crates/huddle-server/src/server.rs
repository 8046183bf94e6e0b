//! `HuddleServer`: Axum HTTP + `WebSocket` server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{FromRef, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use huddle_auth::IdentityProvider;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::command::context::CommandContext;
use crate::command::registry::CommandRegistry;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::http::auth::{self, AuthState};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::LiveConnections;
use crate::websocket::session::{SessionShared, serve_socket};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// What every `WebSocket` session needs.
    pub session: SessionShared,
    /// OAuth provider and state token.
    pub auth: AuthState,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// The main Huddle server.
pub struct HuddleServer {
    config: Arc<ServerConfig>,
    registry: Arc<CommandRegistry>,
    ctx: Arc<CommandContext>,
    auth: AuthState,
    shutdown: Arc<ShutdownCoordinator>,
    live: LiveConnections,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl HuddleServer {
    /// Create a new server. The registry is frozen from here on.
    pub fn new(
        config: ServerConfig,
        registry: CommandRegistry,
        ctx: CommandContext,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            ctx: Arc::new(ctx),
            auth: AuthState::new(provider),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            live: LiveConnections::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: SessionShared {
                registry: self.registry.clone(),
                ctx: self.ctx.clone(),
                config: self.config.clone(),
                shutdown: self.shutdown.token(),
                live: self.live.clone(),
            },
            auth: self.auth.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(auth::LOGIN_PATH, get(auth::login))
            .route("/callback", get(auth::callback))
            .route(&self.config.ws_path, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any))
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(err) = result {
                error!(error = %err, "server error");
            }
        });
        info!(%addr, ws_path = %self.config.ws_path, "huddle server listening");
        Ok((addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the command registry.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Get the handler context.
    pub fn context(&self) -> &Arc<CommandContext> {
        &self.ctx
    }

    /// Number of live `WebSocket` connections.
    pub fn connection_count(&self) -> usize {
        self.live.count()
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.session.live.count(),
        state.session.ctx.tasks.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET <ws_path>: upgrade and hand the socket to a session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let shared = state.session;
    ws.max_message_size(shared.config.max_message_size)
        .on_upgrade(move |socket| serve_socket(socket, shared))
}
