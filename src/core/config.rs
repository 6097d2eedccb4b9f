use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use super::alerts::engine::AlertEngineConfig;
use super::alerts::messages::MessageCatalog;
use super::narrator::NarratorConfig;

/// Application settings. Every section is optional in the file.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    /// Alert engine configuration
    #[serde(default)]
    pub alerts: AlertEngineConfig,
    #[serde(default)]
    pub narrator: NarratorConfig,
    /// Replaces the built-in message catalog when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<MessageCatalog>,
}

impl Settings {
    pub fn catalog(&self) -> MessageCatalog {
        self.messages.clone().unwrap_or_default()
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Use an explicit settings file instead of `<dir>/settings.json`.
    pub fn with_file(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load settings; a missing or unreadable file yields the defaults.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(&self.config_path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Invalid settings in {}: {}; using defaults", self.config_path.display(), e);
                    Settings::default()
                }
            },
            Err(e) => {
                warn!("Cannot read {}: {}; using defaults", self.config_path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::speech::SpeechBackendKind;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("nested"));

        let default = manager.load();
        assert_eq!(default, Settings::default());
        assert_eq!(default.alerts.min_global_interval_seconds, 30);

        let mut new_settings = Settings::default();
        new_settings.alerts.per_kind_cooldown_seconds = 5;
        new_settings.narrator.backend = SpeechBackendKind::None;

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded.alerts.per_kind_cooldown_seconds, 5);
        assert_eq!(loaded.narrator.backend, SpeechBackendKind::None);
        assert!(loaded.messages.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{ "alerts": { "history_limit": 7 }, "narrator": { "backend": "none" } }"#).unwrap();

        let settings = ConfigManager::with_file(path).load();
        assert_eq!(settings.alerts.history_limit, 7);
        assert_eq!(settings.alerts.per_kind_cooldown_seconds, 60);
        assert_eq!(settings.narrator.backend, SpeechBackendKind::None);
        assert_eq!(settings.narrator.stop_timeout_ms, 2000);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert_eq!(manager.load(), Settings::default());
    }

    #[test]
    fn test_custom_catalog_replaces_builtin() {
        let mut settings = Settings::default();
        assert!(settings.catalog().locations.contains_key("Tanglin Carpark"));

        let custom = MessageCatalog::new(MessageCatalog::builtin().default);
        settings.messages = Some(custom.clone());
        assert_eq!(settings.catalog(), custom);
    }
}
