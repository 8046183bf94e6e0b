//! User handlers: edit, subscribe, unsubscribe.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_store::Query;
use serde_json::Value;
use tracing::instrument;

use crate::command::context::CommandContext;
use crate::command::errors::CommandError;
use crate::command::registry::CommandHandler;
use crate::websocket::connection::Connection;
use crate::websocket::feed_bridge::spawn_subscription;
use crate::websocket::subscriptions::SubscriptionKey;

/// Storage table holding users.
pub const USER_TABLE: &str = "user";

/// Fields a client may never overwrite through `user edit`.
const PROTECTED_FIELDS: [&str; 2] = ["id", "auth_service_id"];

/// Patch the logged-in user's record.
pub struct EditUserHandler;

#[async_trait]
impl CommandHandler for EditUserHandler {
    #[instrument(skip_all, fields(command = "user edit"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let user_id = conn.user_id().ok_or(CommandError::NotLoggedIn)?;
        let Value::Object(mut patch) = data else {
            return Err(CommandError::invalid("user edit payload must be an object"));
        };

        if let Some(name) = patch.get("name") {
            let name = name
                .as_str()
                .ok_or_else(|| CommandError::invalid("Field 'name' must be a string"))?
                .to_owned();
            let _ = conn.update_user(|user| user.name = name);
        }
        for field in PROTECTED_FIELDS {
            let _ = patch.remove(field);
        }

        let store = Arc::clone(&ctx.store);
        ctx.spawn_mutation(conn, "user edit", async move {
            store.update(USER_TABLE, &user_id, Value::Object(patch)).await?;
            Ok(())
        });
        Ok(())
    }
}

/// Stream every user change to the client.
pub struct SubscribeUsersHandler;

#[async_trait]
impl CommandHandler for SubscribeUsersHandler {
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        _data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let store = Arc::clone(&ctx.store);
        let _ = spawn_subscription(conn, SubscriptionKey::UserList, USER_TABLE, move || async move {
            store.watch(Query::table(USER_TABLE), true).await
        });
        Ok(())
    }
}

/// Stop the user stream.
pub struct UnsubscribeUsersHandler;

#[async_trait]
impl CommandHandler for UnsubscribeUsersHandler {
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        _data: Value,
        _ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let _ = conn.subscriptions().cancel(SubscriptionKey::UserList);
        Ok(())
    }
}
