use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_APP_NAME: &str = "VisualExplain";
const APP_DIR_NAME: &str = "visual-explain";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Chat-completion endpoint used by every stage.
    pub api_url: String,
    /// Sent as both identifying headers (`HTTP-Referer`, `X-Title`).
    pub app_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(app_data: &Path) -> Self {
        let config_path = app_data.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    log::warn!("Ignoring malformed {}: {}", config_path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}", config_path.display(), e);
                    Self::default()
                }
            }
        } else {
            let c = Self::default();
            c.save(app_data);
            c
        };

        if let Ok(url) = std::env::var("VISUAL_EXPLAIN_API_URL") {
            if !url.trim().is_empty() {
                config.api_url = url.trim().to_string();
            }
        }

        config
    }

    pub fn save(&self, app_data: &Path) {
        let config_path = app_data.join(CONFIG_FILE);
        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&config_path, content) {
                    log::warn!("Failed to write {}: {}", config_path.display(), e);
                }
            }
            Err(e) => log::warn!("Failed to serialize config: {}", e),
        }
    }
}

/// Per-user directory holding `config.json` and the credential database.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
