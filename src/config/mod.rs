// Configuration module for edge-datasync
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - User override file merging
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load the base configuration, merge the user override file when it can be
/// read, then apply environment variable overrides
pub fn load_config_with_user<P: AsRef<Path>, U: AsRef<Path>>(
    path: P,
    user_path: Option<U>,
) -> Result<SyncConfig> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, user_path.as_ref().map(|p| p.as_ref()))?;
    Ok(config)
}

/// Merge the user override file and environment overrides into a loaded
/// configuration and validate the result
///
/// A user file that cannot be read or parsed is logged and skipped.
pub fn apply_overrides(config: &mut SyncConfig, user_path: Option<&Path>) -> Result<()> {
    if let Some(user_path) = user_path {
        match ConfigLoader::load_user(user_path) {
            Ok(user) => config.merge_user(user),
            Err(e) => warn!("Ignoring user config {}: {:#}", user_path.display(), e),
        }
    }

    // Allow environment variables to override config values
    if let Ok(device_id) = std::env::var("DEVICE_ID") {
        config.mqtt.client_id = device_id;
    }

    if let Ok(main_folder) = std::env::var("DATASYNC_MAIN_FOLDER") {
        config.server.main_folder = main_folder;
    }

    ConfigLoader::validate(config).context("Invalid configuration after merging overrides")
}
