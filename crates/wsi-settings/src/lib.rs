//! # wsi-settings
//!
//! Configuration for the wsi server.
//!
//! Settings are resolved in three layers, lowest priority first:
//! 1. compiled defaults ([`WsiSettings::default`])
//! 2. a JSON file (`~/.wsi/settings.json` unless a path is given), deep-merged
//! 3. `WSI_*` environment variables

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, DispatchSettings, LoggingSettings, ServerSettings, WsiSettings};
