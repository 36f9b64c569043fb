//! Configuration loading facade.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::CardpostConfig;
use crate::error::CardpostError;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::debug;

/// Loads [`CardpostConfig`] from layered sources.
///
/// Order, lowest precedence first:
/// 1. merge-policy defaults
/// 2. global file (`$XDG_CONFIG_HOME/cardpost/config.toml`)
/// 3. workspace files (`<workspace>/config/config.toml`, `config/$CARDPOST_ENV.toml`)
/// 4. environment variables (`CARDPOST__SERVER__HOST=...`)
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(workspace_root: &Path) -> Result<CardpostConfig, CardpostError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(env_source()).build()?;
        let config: CardpostConfig = config.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            host = %config.server.host,
            port = config.server.port,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load a single file on top of the defaults. Environment overrides still apply.
    pub fn load_from_file(path: &Path) -> Result<CardpostConfig, CardpostError> {
        if !path.exists() {
            return Err(CardpostError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults plus environment, ignoring every file.
    pub fn load_defaults() -> Result<CardpostConfig, CardpostError> {
        let config: Config = merge_policy::builder_with_defaults()?
            .add_source(env_source())
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("CARDPOST")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
