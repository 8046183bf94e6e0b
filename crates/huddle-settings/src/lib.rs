//! # huddle-settings
//!
//! Settings are loaded from three layers (lowest to highest priority):
//! 1. **Compiled defaults**: [`HuddleSettings::default()`]
//! 2. **User file**: `~/.huddle/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `HUDDLE_*` and `GOOGLE_*` overrides
//!
//! The binary applies its CLI flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, HuddleSettings, LoggingSettings, ServerSettings};
