//! # huddle
//!
//! Huddle chat server binary: loads settings, wires storage, search, and
//! the identity provider into the server, and runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_auth::{GoogleProvider, OAuthConfig};
use huddle_core::logging::{LogFormat, init_subscriber};
use huddle_server::command::context::CommandContext;
use huddle_server::command::handlers::register_all;
use huddle_server::command::registry::CommandRegistry;
use huddle_server::config::ServerConfig;
use huddle_server::server::HuddleServer;
use huddle_settings::{AuthSettings, HuddleSettings};
use huddle_store::{MemoryIndex, MemoryStore};

/// Huddle chat server.
#[derive(Parser, Debug)]
#[command(name = "huddle", about = "Huddle real-time chat server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.huddle/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `huddle_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer CLI flags over loaded settings.
    fn apply(&self, settings: &mut HuddleSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn oauth_config(auth: &AuthSettings) -> OAuthConfig {
    OAuthConfig {
        client_id: auth.client_id.clone(),
        client_secret: auth.client_secret.clone(),
        redirect_url: auth.redirect_url.clone(),
        auth_url: auth.auth_url.clone(),
        token_url: auth.token_url.clone(),
        userinfo_url: auth.userinfo_url.clone(),
        scopes: auth.scopes.clone(),
    }
}

/// Build a server over in-memory storage and search.
fn build_server(settings: &HuddleSettings) -> Result<HuddleServer> {
    let ctx = CommandContext::new(Arc::new(MemoryStore::new()), Arc::new(MemoryIndex::new()));

    let mut registry = CommandRegistry::new();
    register_all(&mut registry).context("Failed to register command handlers")?;

    let oauth = oauth_config(&settings.auth);
    if !oauth.is_configured() {
        tracing::warn!("Google client credentials missing, /callback will always redirect to /login");
    }
    let provider = Arc::new(GoogleProvider::new(oauth));

    Ok(HuddleServer::new(
        ServerConfig::from(&settings.server),
        registry,
        ctx,
        provider,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => huddle_settings::load_settings_from_path(path),
        None => huddle_settings::load_settings(),
    }
    .context("Failed to load settings")?;
    args.apply(&mut settings);

    init_subscriber(&settings.logging.level, LogFormat::from_name(&settings.logging.format));

    let mut server = build_server(&settings)?;
    match huddle_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(err) => tracing::warn!(error = %err, "metrics recorder unavailable"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    let command_count = server.registry().names().len();
    tracing::info!(
        "Huddle listening on http://{addr} ({command_count} commands registered)"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(handle, &server.context().tasks, None)
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
