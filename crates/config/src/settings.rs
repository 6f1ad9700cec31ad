use std::fs;
use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use rankgrid_engine::SessionOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Session
    #[serde(rename = "session.rowKeyColumn")]
    pub row_key_column: String,

    #[serde(rename = "session.defaultPageName")]
    pub default_page_name: String,

    #[serde(rename = "history.limit")]
    pub history_limit: usize,

    // File
    #[serde(rename = "file.storePath")]
    pub store_path: Option<PathBuf>, // None = pass --store on every call

    // Logging: off, error, warn, info, debug, trace
    #[serde(rename = "log.level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            row_key_column: "Model".to_string(),
            default_page_name: "Default".to_string(),
            history_limit: 100,
            store_path: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rankgrid");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`. A missing file gives the defaults; an
    /// unreadable or invalid one gives the defaults and a warning.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                // Strip comments (lines starting with //)
                let cleaned: String = contents
                    .lines()
                    .filter(|line| !line.trim().starts_with("//"))
                    .collect::<Vec<_>>()
                    .join("\n");

                match serde_json::from_str(&cleaned) {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::warn!("error parsing {}: {}; using default settings", path.display(), e);
                        Self::default()
                    }
                }
            }
            Err(e) => {
                tracing::warn!("error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Engine options for a new or loaded session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            row_key: self.row_key_column.clone(),
            default_page: self.default_page_name.clone(),
            history_limit: self.history_limit.max(1),
        }
    }

    /// Parsed `log.level`; unknown values fall back to `warn`.
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::WARN)
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
