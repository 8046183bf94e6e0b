//! Identity handlers: `google signup`, `google login`, `check login`.
//!
//! All three look a user up by the provider-issued `auth_service_id`, fill
//! the connection's user snapshot, and reply with a `check login` envelope
//! carrying the sanitized profile. Signup and login create the record when
//! it is missing.
//!
//! Lookup-then-insert is not atomic: two concurrent signups for the same
//! external id can both insert.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use huddle_core::Envelope;
use huddle_core::models::{STATUS_ONLINE, User, UserProfile, derive_username};
use huddle_store::{Predicate, StoreError};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::user::USER_TABLE;
use super::{CHECK_LOGIN, decode_payload};
use crate::command::context::CommandContext;
use crate::command::errors::CommandError;
use crate::command::registry::CommandHandler;
use crate::websocket::connection::Connection;

/// Reply body when no user matches.
pub const NOT_LOGGED_IN: &str = "Not logged in";

/// Find the user record for an external id.
async fn lookup(ctx: &CommandContext, auth_service_id: &str) -> Result<Option<User>, CommandError> {
    let rows = ctx
        .store
        .filter(USER_TABLE, Predicate::eq("auth_service_id", auth_service_id))
        .await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row).map_err(StoreError::from)?)),
        None => Ok(None),
    }
}

/// Return the existing user for `payload`, creating it when absent.
async fn lookup_or_create(ctx: &CommandContext, payload: User) -> Result<User, CommandError> {
    if payload.auth_service_id.is_empty() {
        return Err(CommandError::invalid("Missing required field: auth_service_id"));
    }
    if let Some(existing) = lookup(ctx, &payload.auth_service_id).await? {
        debug!(user_id = ?existing.id, "existing user");
        return Ok(existing);
    }

    let mut user = User {
        id: None,
        username: derive_username(&payload.name),
        status: STATUS_ONLINE.to_owned(),
        created_at: Some(Utc::now()),
        ..payload
    };
    let record = serde_json::to_value(&user).map_err(StoreError::from)?;
    let id = ctx.store.insert(USER_TABLE, record).await?;
    info!(user_id = %id, username = %user.username, "user signed up");
    user.id = Some(id);
    Ok(user)
}

/// Install `user` as the snapshot and reply with its profile.
async fn reply_logged_in(conn: &Connection, user: User) -> Result<(), CommandError> {
    let profile = serde_json::to_value(UserProfile::from(&user)).map_err(StoreError::from)?;
    conn.set_user(user);
    let _ = conn.send(Envelope::new(CHECK_LOGIN, profile)).await;
    Ok(())
}

/// Register a user, or log in an already registered one.
pub struct SignupHandler;

#[async_trait]
impl CommandHandler for SignupHandler {
    #[instrument(skip_all, fields(command = "google signup"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let payload: User = decode_payload(data)?;
        let user = lookup_or_create(ctx, payload).await?;
        reply_logged_in(conn, user).await
    }
}

/// Log in a user, registering them on first contact.
pub struct LoginHandler;

#[async_trait]
impl CommandHandler for LoginHandler {
    #[instrument(skip_all, fields(command = "google login"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let payload: User = decode_payload(data)?;
        let user = lookup_or_create(ctx, payload).await?;
        reply_logged_in(conn, user).await
    }
}

/// Restore a session from a remembered external id, never creating one.
pub struct CheckLoginHandler;

#[async_trait]
impl CommandHandler for CheckLoginHandler {
    #[instrument(skip_all, fields(command = "check login"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let auth_service_id = data
            .get("auth_service_id")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let found = if auth_service_id.is_empty() {
            None
        } else {
            lookup(ctx, auth_service_id).await?
        };

        match found {
            Some(user) => reply_logged_in(conn, user).await,
            None => {
                let _ = conn
                    .send(Envelope::new(CHECK_LOGIN, Value::from(NOT_LOGGED_IN)))
                    .await;
                Ok(())
            }
        }
    }
}
