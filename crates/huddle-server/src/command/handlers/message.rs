//! Message handlers: add, delete, subscribe, unsubscribe.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use huddle_core::models::ChatMessage;
use huddle_store::{Query, StoreError};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::{decode_payload, require_string_field};
use crate::command::context::CommandContext;
use crate::command::errors::CommandError;
use crate::command::registry::CommandHandler;
use crate::websocket::connection::Connection;
use crate::websocket::feed_bridge::spawn_subscription;
use crate::websocket::subscriptions::SubscriptionKey;

/// Storage table holding messages.
pub const MESSAGE_TABLE: &str = "message";

/// Most recent messages delivered when subscribing to a channel.
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddMessage {
    #[serde(alias = "channelId")]
    channel_id: String,
    body: String,
    attachments: String,
}

/// Post a message, stamped with the author from the user snapshot.
pub struct AddMessageHandler;

#[async_trait]
impl CommandHandler for AddMessageHandler {
    #[instrument(skip_all, fields(command = "message add"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let payload: AddMessage = decode_payload(data)?;
        if payload.channel_id.is_empty() {
            return Err(CommandError::invalid("Missing required field: channel_id"));
        }

        // Anonymous posts keep empty author fields.
        let author = conn.user().unwrap_or_default();
        let message = ChatMessage {
            id: None,
            channel_id: payload.channel_id,
            body: payload.body,
            author: author.name,
            username: author.username,
            user_id: author.id.unwrap_or_default(),
            attachments: payload.attachments,
            created_at: Some(Utc::now()),
        };
        let record = serde_json::to_value(&message).map_err(StoreError::from)?;

        let store = Arc::clone(&ctx.store);
        ctx.spawn_mutation(conn, "message add", async move {
            let _ = store.insert(MESSAGE_TABLE, record).await?;
            Ok(())
        });
        Ok(())
    }
}

/// Delete a message by id.
pub struct DeleteMessageHandler;

#[async_trait]
impl CommandHandler for DeleteMessageHandler {
    #[instrument(skip_all, fields(command = "message delete"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let id = require_string_field(&data, "id")?;
        let store = Arc::clone(&ctx.store);
        ctx.spawn_mutation(conn, "message delete", async move {
            store.delete(MESSAGE_TABLE, &id).await?;
            Ok(())
        });
        Ok(())
    }
}

/// Stream one channel's most recent messages, oldest first, then live changes.
pub struct SubscribeMessagesHandler;

#[async_trait]
impl CommandHandler for SubscribeMessagesHandler {
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let channel_id = require_string_field(&data, "channelId")?;
        let query = Query::table(MESSAGE_TABLE)
            .filter_eq("channel_id", channel_id)
            .order_by("created_at")
            .limit(HISTORY_LIMIT);

        let store = Arc::clone(&ctx.store);
        let _ = spawn_subscription(
            conn,
            SubscriptionKey::ChannelMessages,
            MESSAGE_TABLE,
            move || async move { store.watch(query, true).await },
        );
        Ok(())
    }
}

/// Stop the message stream.
pub struct UnsubscribeMessagesHandler;

#[async_trait]
impl CommandHandler for UnsubscribeMessagesHandler {
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        _data: Value,
        _ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let _ = conn.subscriptions().cancel(SubscriptionKey::ChannelMessages);
        Ok(())
    }
}
