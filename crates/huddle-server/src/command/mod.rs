//! Command routing: the registry, its context, and the built-in handlers.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;

pub use context::CommandContext;
pub use errors::{CommandError, RegistryError};
pub use registry::{CommandHandler, CommandRegistry};
