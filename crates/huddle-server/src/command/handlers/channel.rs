//! Channel handlers: add, subscribe, unsubscribe, search.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_core::Envelope;
use huddle_core::models::{Channel, PUBLIC_CHANNEL};
use huddle_store::{Query, StoreError, TermQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{MORE_CHANNELS, decode_payload, require_string_field};
use crate::command::context::CommandContext;
use crate::command::errors::CommandError;
use crate::command::registry::CommandHandler;
use crate::websocket::connection::Connection;
use crate::websocket::feed_bridge::spawn_subscription;
use crate::websocket::subscriptions::SubscriptionKey;

/// Storage table holding channels.
pub const CHANNEL_TABLE: &str = "channel";

/// Search collection holding channel documents.
pub const CHANNEL_COLLECTION: &str = "channels";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddChannel {
    name: String,
    purpose: String,
}

/// One channel search hit.
#[derive(Debug, Serialize)]
struct ChannelHit {
    id: String,
    name: String,
    purpose: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Create a public channel and index it for search.
pub struct AddChannelHandler;

#[async_trait]
impl CommandHandler for AddChannelHandler {
    #[instrument(skip_all, fields(command = "channel add"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let payload: AddChannel = decode_payload(data)?;
        if payload.name.trim().is_empty() {
            return Err(CommandError::invalid("Missing required field: name"));
        }

        let channel = Channel {
            id: None,
            name: payload.name,
            kind: PUBLIC_CHANNEL.to_owned(),
            purpose: payload.purpose,
        };
        let record = serde_json::to_value(&channel).map_err(StoreError::from)?;

        let store = Arc::clone(&ctx.store);
        let search = Arc::clone(&ctx.search);
        ctx.spawn_mutation(conn, "channel add", async move {
            let id = store.insert(CHANNEL_TABLE, record.clone()).await?;
            search.index(CHANNEL_COLLECTION, &id, record).await?;
            debug!(channel_id = %id, "channel created");
            Ok(())
        });
        Ok(())
    }
}

/// Stream every channel change to the client.
pub struct SubscribeChannelsHandler;

#[async_trait]
impl CommandHandler for SubscribeChannelsHandler {
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        _data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let store = Arc::clone(&ctx.store);
        let _ = spawn_subscription(conn, SubscriptionKey::ChannelList, CHANNEL_TABLE, move || async move {
            store.watch(Query::table(CHANNEL_TABLE), true).await
        });
        Ok(())
    }
}

/// Stop the channel stream.
pub struct UnsubscribeChannelsHandler;

#[async_trait]
impl CommandHandler for UnsubscribeChannelsHandler {
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        _data: Value,
        _ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let _ = conn.subscriptions().cancel(SubscriptionKey::ChannelList);
        Ok(())
    }
}

/// Term search over channel purposes.
pub struct SearchChannelsHandler;

#[async_trait]
impl CommandHandler for SearchChannelsHandler {
    #[instrument(skip_all, fields(command = "channel search"))]
    async fn handle(
        &self,
        conn: &Arc<Connection>,
        data: Value,
        ctx: &Arc<CommandContext>,
    ) -> Result<(), CommandError> {
        let term = require_string_field(&data, "channel")?.trim().to_lowercase();
        let hits = ctx
            .search
            .search(CHANNEL_COLLECTION, &TermQuery::new("purpose", term))
            .await?;

        if hits.is_empty() {
            debug!("no channels found");
            let _ = conn.send_error("No channels found").await;
            return Ok(());
        }

        let results: Vec<ChannelHit> = hits
            .into_iter()
            .map(|hit| {
                let field = |name: &str| {
                    hit.source
                        .get(name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned()
                };
                ChannelHit {
                    name: field("name"),
                    purpose: field("purpose"),
                    kind: field("type"),
                    id: hit.id.clone(),
                }
            })
            .collect();
        let data = serde_json::to_value(results).map_err(StoreError::from)?;
        let _ = conn.send(Envelope::new(MORE_CHANNELS, data)).await;
        Ok(())
    }
}
