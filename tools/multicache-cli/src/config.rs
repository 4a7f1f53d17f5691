//! CLI configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use multicache::RegistryConfig;

/// File names searched for when no `--config` is given.
pub const CONFIG_NAMES: [&str; 3] = ["multicache.toml", ".multicache.toml", "multicache.json"];

/// Load a registry config from a file.
///
/// JSON when the path ends in `.json`, TOML otherwise.
pub fn load(path: &str) -> Result<RegistryConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;

    let config: RegistryConfig = if path.ends_with(".json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path))?
    };

    config
        .validate()
        .with_context(|| format!("Invalid config: {}", path))?;
    Ok(config)
}

/// Find a config file in `start` or any parent directory.
pub fn find(start: &Path) -> Option<(PathBuf, RegistryConfig)> {
    let mut current = start.to_path_buf();
    loop {
        for name in &CONFIG_NAMES {
            let config_path = current.join(name);
            if config_path.exists() {
                if let Ok(config) = load(config_path.to_str()?) {
                    return Some((config_path, config));
                }
            }
        }

        if !current.pop() {
            break;
        }
    }

    None
}
