//! Runtime settings for the observer engine.
//!
//! Settings come from three places, later ones winning:
//! - built-in defaults
//! - a JSON file or the `settings` table
//! - `OBSERVER_*` environment variables (API connection only)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::log_warn;

pub const DEFAULT_REPLY_COUNT: u32 = 3;
pub const DEFAULT_PACING_MS: u64 = 500;
pub const DEFAULT_RECALL_DELAY_MS: u64 = 1000;
pub const DEFAULT_TEMPERATURE: f64 = 0.8;
pub const DEFAULT_MAX_MEMORY: usize = 10;

/// Connection details for the chat backend.
///
/// Only presence is validated, never format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl ApiConfig {
    pub fn effective_temperature(&self) -> f64 {
        self.temperature
            .filter(|t| t.is_finite())
            .unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.endpoint_url.trim().is_empty() {
            missing.push("endpointUrl");
        }
        if self.api_key.trim().is_empty() {
            missing.push("apiKey");
        }
        if self.model.trim().is_empty() {
            missing.push("model");
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverSettings {
    #[serde(default)]
    pub api: ApiConfig,
    /// Number of chat bubbles the model is asked to split a round into.
    #[serde(default = "default_reply_count")]
    pub reply_count: u32,
    /// Delay between two dispatched actions.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Delay between a `send_and_recall` message and its recall notice.
    #[serde(default = "default_recall_delay_ms")]
    pub recall_delay_ms: u64,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_reply_count() -> u32 {
    DEFAULT_REPLY_COUNT
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

fn default_recall_delay_ms() -> u64 {
    DEFAULT_RECALL_DELAY_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            reply_count: DEFAULT_REPLY_COUNT,
            pacing_ms: DEFAULT_PACING_MS,
            recall_delay_ms: DEFAULT_RECALL_DELAY_MS,
            request_timeout_ms: None,
            database_path: None,
            log_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl ObserverSettings {
    pub fn from_json_file(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings file {:?}: {}", path, e))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let mut settings: ObserverSettings =
            serde_json::from_str(raw).map_err(|e| format!("Invalid settings JSON: {}", e))?;
        settings.normalize();
        Ok(settings)
    }

    /// Overlay `OBSERVER_ENDPOINT_URL`, `OBSERVER_API_KEY`, `OBSERVER_MODEL` and
    /// `OBSERVER_TEMPERATURE` when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("OBSERVER_ENDPOINT_URL") {
            self.api.endpoint_url = v;
        }
        if let Some(v) = lookup("OBSERVER_API_KEY") {
            self.api.api_key = v;
        }
        if let Some(v) = lookup("OBSERVER_MODEL") {
            self.api.model = v;
        }
        if let Some(v) = lookup("OBSERVER_TEMPERATURE") {
            match v.trim().parse::<f64>() {
                Ok(t) => self.api.temperature = Some(t),
                Err(_) => log_warn(
                    "config",
                    format!("ignoring unparsable OBSERVER_TEMPERATURE={}", v),
                ),
            }
        }
    }

    pub fn normalize(&mut self) {
        if self.reply_count == 0 {
            self.reply_count = DEFAULT_REPLY_COUNT;
        }
    }

    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("observer-chat")
                .join("app.db")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings = ObserverSettings::from_json_str("{}").unwrap();
        assert_eq!(settings.reply_count, 3);
        assert_eq!(settings.pacing_ms, 500);
        assert_eq!(settings.recall_delay_ms, 1000);
        assert_eq!(settings.request_timeout_ms, None);
        assert_eq!(settings.api.effective_temperature(), 0.8);
    }

    #[test]
    fn test_zero_reply_count_falls_back_to_default() {
        let settings = ObserverSettings::from_json_str(r#"{"replyCount": 0}"#).unwrap();
        assert_eq!(settings.reply_count, DEFAULT_REPLY_COUNT);
    }

    #[test]
    fn test_missing_fields_reports_blank_values() {
        let cfg = ApiConfig {
            endpoint_url: "https://api.example.com".into(),
            api_key: "  ".into(),
            model: String::new(),
            temperature: None,
        };
        assert_eq!(cfg.missing_fields(), vec!["apiKey", "model"]);
    }

    #[test]
    fn test_overrides_replace_api_fields() {
        let env: HashMap<&str, &str> = [
            ("OBSERVER_API_KEY", "sk-test"),
            ("OBSERVER_MODEL", "gpt-4o-mini"),
            ("OBSERVER_TEMPERATURE", "0.3"),
        ]
        .into_iter()
        .collect();
        let mut settings = ObserverSettings::default();
        settings.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.api.api_key, "sk-test");
        assert_eq!(settings.api.model, "gpt-4o-mini");
        assert_eq!(settings.api.temperature, Some(0.3));
        assert!(settings.api.endpoint_url.is_empty());
    }
}
