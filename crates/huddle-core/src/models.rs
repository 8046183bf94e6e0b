//! Domain entity shapes.
//!
//! These are payload shapes only: storage holds them as JSON records and
//! handlers decode/encode them with serde. Unknown fields are ignored on
//! decode so older clients keep working.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel type assigned to every channel created through the API.
pub const PUBLIC_CHANNEL: &str = "public";

/// Presence status written at signup.
pub const STATUS_ONLINE: &str = "Online";

/// A registered user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Storage key. Absent until the record is inserted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Handle derived from the display name at signup.
    pub username: String,
    /// Email address reported by the identity provider.
    pub email: String,
    /// Avatar URL.
    pub avatar: String,
    /// Identity provider name (`"google"`).
    pub provider: String,
    /// Provider-side account id.
    pub auth_service_id: String,
    /// Preferred locale.
    pub locale: String,
    /// Assigned role.
    pub role_id: String,
    /// Clock display preference.
    pub military_time: String,
    /// Presence status.
    pub status: String,
    /// Signup time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Sanitized user view sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Storage key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Handle.
    pub username: String,
    /// Avatar URL.
    pub avatar: String,
    /// Presence status.
    pub status: String,
    /// Signup time.
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone().unwrap_or_default(),
            name: user.name.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            status: user.status.clone(),
            created_at: user.created_at,
        }
    }
}

/// A chat channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    /// Storage key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Channel name.
    pub name: String,
    /// Visibility (`"public"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-text purpose, also the searchable field.
    pub purpose: String,
}

/// A message posted to a channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    /// Storage key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning channel.
    pub channel_id: String,
    /// Message text.
    pub body: String,
    /// Display name of the author.
    pub author: String,
    /// Handle of the author.
    pub username: String,
    /// Author's user id.
    pub user_id: String,
    /// Serialized attachment list.
    pub attachments: String,
    /// Post time, used to order channel history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// An authorization role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Role {
    /// Storage key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Role name.
    pub name: String,
    /// Human description.
    pub description: String,
}

/// Join row between users and roles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRole {
    /// User side.
    pub user_id: String,
    /// Role side.
    pub role_id: String,
}

/// Derive a handle from a display name.
///
/// Lowercases the name and joins the first two words with `_`. A single
/// word is used as-is; a blank name yields `"user"`.
pub fn derive_username(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut words = lower.split_whitespace();
    match (words.next(), words.next()) {
        (Some(first), Some(second)) => format!("{first}_{second}"),
        (Some(first), None) => first.to_owned(),
        (None, _) => "user".to_owned(),
    }
}
