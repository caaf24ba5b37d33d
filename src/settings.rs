//! Shared application settings for the phone-pilot CLI.
//! Persisted in the platform-specific config directory via
//! `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Model API base URL
    pub base_url: String,
    /// Model API key (redacted on save unless explicitly allowed)
    pub api_key: String,
    /// Model name
    pub model_name: String,
    /// Model request timeout in seconds
    pub timeout_secs: u64,
    /// Device transport ("adb" or "hdc")
    pub device_kind: String,
    /// Device ID (empty = first available)
    pub device_id: String,
    /// Language code ("cn" or "en")
    pub lang: String,
    /// Maximum steps for a task
    pub max_steps: u32,
    /// Use the compact third-party prompt shape
    pub use_thirdparty_prompt: bool,
    /// Third-party mode outputs <think>/<answer>
    pub thirdparty_thinking: bool,
    /// Downsize screenshots before sending them to the model
    pub compress_image: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "autoglm-phone-9b".to_string(),
            timeout_secs: 30,
            device_kind: "adb".to_string(),
            device_id: String::new(),
            lang: "cn".to_string(),
            max_steps: 100,
            use_thirdparty_prompt: false,
            thirdparty_thinking: true,
            compress_image: false,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "phone-pilot", "phone-pilot")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Save settings to the config file.
    ///
    /// The API key is redacted unless `allow_secrets` is set (the
    /// `PHONE_PILOT_ALLOW_CONFIG_FILE_SECRETS` env toggle in the CLI), so a
    /// casually shared config file does not leak credentials.
    pub fn save(&self, allow_secrets: bool) -> Result<(), String> {
        let path = Self::settings_path().ok_or("could not resolve config directory")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let to_write = self.redacted(allow_secrets);
        let content = serde_json::to_string_pretty(&to_write).map_err(|e| e.to_string())?;
        fs::write(&path, content).map_err(|e| e.to_string())
    }

    /// Copy of the settings with the API key blanked unless allowed.
    pub fn redacted(&self, allow_secrets: bool) -> Self {
        let mut copy = self.clone();
        if !allow_secrets {
            copy.api_key = String::new();
        }
        copy
    }
}

/// Truthy check for env toggles ("1", "true", "yes", "on").
pub fn env_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.base_url, "http://localhost:8000/v1");
        assert_eq!(settings.device_kind, "adb");
        assert_eq!(settings.max_steps, 100);
        assert!(!settings.use_thirdparty_prompt);
    }

    #[test]
    fn test_redaction() {
        let mut settings = AppSettings::default();
        settings.api_key = "sk-secret".to_string();

        assert_eq!(settings.redacted(false).api_key, "");
        assert_eq!(settings.redacted(true).api_key, "sk-secret");
    }

    #[test]
    fn test_env_truthy() {
        assert!(env_truthy("1"));
        assert!(env_truthy("TRUE"));
        assert!(env_truthy(" yes "));
        assert!(!env_truthy("0"));
        assert!(!env_truthy(""));
    }

    #[test]
    fn test_settings_round_trip_json() {
        let settings = AppSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let loaded: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.base_url, settings.base_url);
        assert_eq!(loaded.max_steps, settings.max_steps);
    }

    #[test]
    fn test_partial_config_backfills_defaults() {
        let loaded: AppSettings = serde_json::from_str(r#"{"lang": "en"}"#).unwrap();
        assert_eq!(loaded.lang, "en");
        assert_eq!(loaded.max_steps, 100);
    }
}
