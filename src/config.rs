use serde::{Deserialize, Serialize};

use crate::state::UserId;

/// Bootstrap configuration. `bot_token` belongs to the external transport;
/// `initial_admins` only seeds the stored admin set on first run.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub data_file: String,
    pub bot_token: String,
    pub initial_admins: Vec<UserId>,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
}

fn default_items_per_page() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_file: "data.json".to_string(),
            bot_token: String::new(),
            initial_admins: vec![],
            items_per_page: 5,
        }
    }
}

impl AppConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        tracing::info!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        tracing::warn!("Error parsing config: {}. Using defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Error reading config: {}. Using defaults.", e);
                    Self::default()
                }
            }
        } else {
            tracing::info!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewardbot.toml");
        let config = AppConfig::load_or_default(path.to_str().unwrap());
        assert_eq!(config.data_file, "data.json");
        assert_eq!(config.items_per_page, 5);
        // A default file gets written for next time.
        assert!(path.exists());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewardbot.toml");
        let mut config = AppConfig::default();
        config.initial_admins.push("root".to_string());
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AppConfig::load_or_default(path.to_str().unwrap());
        assert_eq!(loaded.initial_admins, vec!["root".to_string()]);
    }
}
