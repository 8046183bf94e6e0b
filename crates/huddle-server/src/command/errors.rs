//! Command dispatch errors.

use huddle_store::StoreError;

/// Error returned by a command handler.
///
/// The `Display` text is what the client receives in the `error` envelope.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No handler is registered under the envelope name.
    #[error("unknown command")]
    UnknownCommand(String),

    /// Payload missing a field or of the wrong shape.
    #[error("{0}")]
    InvalidPayload(String),

    /// The command needs an authenticated user snapshot.
    #[error("Not logged in")]
    NotLoggedIn,

    /// A storage or search collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// Build an [`InvalidPayload`](Self::InvalidPayload) error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Metric label for this error.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::NotLoggedIn => "not_logged_in",
            Self::Store(_) => "store",
        }
    }
}

/// Error building the command table.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A handler already owns this name.
    #[error("command '{0}' is already registered")]
    Duplicate(String),
}
