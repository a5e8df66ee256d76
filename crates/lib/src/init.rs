//! Initialize the configuration directory: create ~/.botrelay and a starter config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{BotConfig, Config, DeliveryConfig, ServerConfig};

/// Starter config: one bot with an empty allow list, the HTTP ingress and a local delivery endpoint.
pub fn starter_config() -> Config {
    let mut config = Config::default();
    config.bots.insert(
        "main".to_string(),
        BotConfig {
            token: Some(String::new()),
            allowed_users: Vec::new(),
            allow_all: false,
        },
    );
    config.server = Some(ServerConfig::default());
    config.delivery = Some(DeliveryConfig {
        url: "http://127.0.0.1:9091/".to_string(),
        timeout_secs: 10,
    });
    config
}

/// Create the config directory and write the starter config if the file does not exist.
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let json = serde_json::to_string_pretty(&starter_config()).context("serializing starter config")?;
        std::fs::write(config_path, json)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn writes_loadable_config_once() {
        let dir = std::env::temp_dir().join(format!("botrelay-init-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("config.json");
        let created = init_config_dir(&path).unwrap();
        assert_eq!(created, dir.join("nested"));

        let (config, _) = load_config(Some(path.clone())).unwrap();
        assert!(config.bots.contains_key("main"));
        assert!(config.server.is_some());

        std::fs::write(&path, "{}").unwrap();
        init_config_dir(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
