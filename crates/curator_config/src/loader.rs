//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::CuratorConfig;
use std::collections::HashSet;
use std::path::Path;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "curator.toml";

/// Loads and validates `curator.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<CuratorConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `curator.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<CuratorConfig, ConfigError> {
    let config: CuratorConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &CuratorConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.data_dirs.is_empty() {
        return Err(ConfigError::MissingField("data_dirs".to_string()));
    }

    let mut aliases = HashSet::new();
    for dir in &config.data_dirs {
        if dir.path.is_empty() {
            return Err(ConfigError::MissingField("data_dirs.path".to_string()));
        }
        if dir.alias.is_empty() || dir.alias.contains(['/', '\\', ':']) {
            return Err(ConfigError::ValidationError(format!(
                "invalid data directory alias '{}'",
                dir.alias
            )));
        }
        if !aliases.insert(dir.alias.to_lowercase()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate data directory alias '{}'",
                dir.alias
            )));
        }
    }

    if config.workers.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "workers.timeout_secs must be greater than zero".to_string(),
        ));
    }
    if config.workers.count == Some(0) {
        return Err(ConfigError::ValidationError(
            "workers.count must be greater than zero".to_string(),
        ));
    }

    let mut extensions = HashSet::new();
    for (name, ty) in &config.asset_types {
        if ty.extensions.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "asset type '{name}' declares no extensions"
            )));
        }
        for ext in &ty.extensions {
            if !extensions.insert(ext.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "extension '{ext}' is claimed by more than one asset type"
                )));
            }
        }
    }
    Ok(())
}
