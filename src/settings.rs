use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PassbookError, Result};

/// User preferences persisted at `~/.config/passbook/settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_price_url")]
    pub price_base_url: String,
    #[serde(default = "default_price_retries")]
    pub price_retries: u32,
    #[serde(default = "default_price_delay_ms")]
    pub price_delay_ms: u64,
}

fn default_price_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".to_string()
}

fn default_price_retries() -> u32 {
    3
}

fn default_price_delay_ms() -> u64 {
    500
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            price_base_url: default_price_url(),
            price_retries: default_price_retries(),
            price_delay_ms: default_price_delay_ms(),
        }
    }
}

/// Everything the ledger and its collaborators need, resolved once at startup
/// and passed in explicitly. Nothing below this layer reads settings files or
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub price: PriceConfig,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub base_url: String,
    pub retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Config {
    pub fn from_settings(settings: &Settings) -> Self {
        Config {
            db_path: PathBuf::from(&settings.data_dir).join("passbook.db"),
            price: PriceConfig {
                base_url: settings.price_base_url.clone(),
                retries: settings.price_retries,
                delay: Duration::from_millis(settings.price_delay_ms),
                timeout: Duration::from_secs(10),
            },
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("passbook")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("passbook")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| PassbookError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            price_base_url: "http://localhost:9999".to_string(),
            price_retries: 5,
            price_delay_ms: 10,
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        std::fs::write(&path, &json).unwrap();
        let loaded: Settings = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.data_dir, "/tmp/test");
        assert_eq!(loaded.price_retries, 5);
        assert_eq!(loaded.price_delay_ms, 10);
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.price_retries, 3);
        assert_eq!(s.price_delay_ms, 500);
        assert!(s.price_base_url.contains("finance"));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings {
            data_dir: "/var/data/pb".to_string(),
            ..Settings::default()
        };
        let config = Config::from_settings(&settings);
        assert_eq!(config.db_path, PathBuf::from("/var/data/pb/passbook.db"));
        assert_eq!(config.price.retries, 3);
        assert_eq!(config.price.delay, Duration::from_millis(500));
    }
}
