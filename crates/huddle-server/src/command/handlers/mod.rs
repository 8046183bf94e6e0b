//! Built-in command handlers and registration.

pub mod channel;
pub mod identity;
pub mod message;
pub mod user;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::errors::{CommandError, RegistryError};
use super::registry::CommandRegistry;

/// Reply name for channel search results.
pub const MORE_CHANNELS: &str = "more channels";

/// Reply name for every identity command.
pub const CHECK_LOGIN: &str = "check login";

/// Register every built-in command with the registry.
pub fn register_all(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    // Channel
    registry.register("channel add", channel::AddChannelHandler)?;
    registry.register("channel subscribe", channel::SubscribeChannelsHandler)?;
    registry.register("channel unsubscribe", channel::UnsubscribeChannelsHandler)?;
    registry.register("channel search", channel::SearchChannelsHandler)?;

    // User
    registry.register("user edit", user::EditUserHandler)?;
    registry.register("user subscribe", user::SubscribeUsersHandler)?;
    registry.register("user unsubscribe", user::UnsubscribeUsersHandler)?;

    // Message
    registry.register("message add", message::AddMessageHandler)?;
    registry.register("message delete", message::DeleteMessageHandler)?;
    registry.register("message subscribe", message::SubscribeMessagesHandler)?;
    registry.register("message unsubscribe", message::UnsubscribeMessagesHandler)?;

    // Identity
    registry.register("google signup", identity::SignupHandler)?;
    registry.register("google login", identity::LoginHandler)?;
    registry.register("check login", identity::CheckLoginHandler)?;
    Ok(())
}

/// Decode a payload into `T`. A missing payload decodes like `{}`.
pub(crate) fn decode_payload<T: DeserializeOwned>(data: Value) -> Result<T, CommandError> {
    let data = if data.is_null() {
        Value::Object(Map::new())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| CommandError::invalid(format!("invalid payload: {e}")))
}

/// Extract a required, non-empty string field.
pub(crate) fn require_string_field(data: &Value, key: &str) -> Result<String, CommandError> {
    let value = data
        .get(key)
        .ok_or_else(|| CommandError::invalid(format!("Missing required field: {key}")))?;
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_owned()),
        Some(_) => Err(CommandError::invalid(format!("Field '{key}' must not be empty"))),
        None => Err(CommandError::invalid(format!("Field '{key}' must be a string"))),
    }
}
