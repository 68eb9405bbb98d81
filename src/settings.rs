use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::DB_FILE;
use crate::error::{Result, TallyError};

/// Overrides `feed.access_token` so the token can stay out of the settings file.
pub const TOKEN_ENV: &str = "TALLY_FEED_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub feed: FeedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

fn default_api_base() -> String {
    "https://api.starlingbank.com/api/v2".to_string()
}

fn default_lookback_days() -> i64 {
    30
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            access_token: String::new(),
            lookback_days: default_lookback_days(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            feed: FeedSettings::default(),
        }
    }
}

impl Settings {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(DB_FILE)
    }

    /// Token from the environment, falling back to the settings file.
    pub fn feed_token(&self) -> Result<String> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.feed.access_token.clone());
        if token.trim().is_empty() {
            return Err(TallyError::Settings(format!(
                "no bank feed token; set {TOKEN_ENV} or feed.access_token in {}",
                settings_path().display()
            )));
        }
        Ok(token.trim().to_string())
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tally")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("tally")
}

fn load_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| TallyError::Settings(format!("{}: {e}", path.display())))
}

fn save_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn load_settings() -> Result<Settings> {
    load_from(&settings_path())
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_to(&settings_path(), settings)
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
