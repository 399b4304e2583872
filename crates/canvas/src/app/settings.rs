//! Persisted desktop settings.

use serde::{Deserialize, Serialize};
use shared::ViewState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Base URL of the dashboard backend
    pub server_url: String,
    /// Last camera, used until the server view arrives
    #[serde(default)]
    pub view: ViewState,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8095".to_string(),
            view: ViewState::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from file, or return default if not found
    pub fn load() -> Self {
        if let Some(dirs) = directories::ProjectDirs::from("com", "opsmap", "opsmap") {
            let config_path = dirs.config_dir().join("settings.json");
            if let Ok(json) = std::fs::read_to_string(&config_path) {
                if let Ok(settings) = serde_json::from_str(&json) {
                    return settings;
                }
            }
        }
        Self::default()
    }

    /// Save settings to file
    pub fn save(&self) {
        if let Some(dirs) = directories::ProjectDirs::from("com", "opsmap", "opsmap") {
            let config_dir = dirs.config_dir();
            if std::fs::create_dir_all(config_dir).is_ok() {
                let config_path = config_dir.join("settings.json");
                if let Ok(json) = serde_json::to_string_pretty(self) {
                    let _ = std::fs::write(config_path, json);
                }
            }
        }
    }
}
