//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SAATHI_SUPABASE_URL).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SAATHI_SUPABASE_URL") {
    Some(url) => url,
    None => "https://project.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SAATHI_SUPABASE_KEY).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SAATHI_SUPABASE_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

pub const DEFAULT_COMPLETION_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "google/gemini-2.5-flash";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Live subscription pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSyncConfig {
    /// Throttle window for ordinary panels.
    pub throttle_ms: u64,
    /// Throttle window for panels whose refetch is costly (inventory).
    pub expensive_throttle_ms: u64,
    /// Hidden time after which channels are torn down.
    pub idle_threshold_secs: u64,
    /// Tear channels down while the host is hidden.
    pub idle_detection: bool,
}

impl Default for LiveSyncConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 1000,
            expensive_throttle_ms: 2000,
            idle_threshold_secs: 300,
            idle_detection: true,
        }
    }
}

impl LiveSyncConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn expensive_throttle(&self) -> Duration {
        Duration::from_millis(self.expensive_throttle_ms)
    }

    /// `None` when idle detection is off.
    pub fn idle_threshold(&self) -> Option<Duration> {
        self.idle_detection
            .then(|| Duration::from_secs(self.idle_threshold_secs))
    }
}

/// AI insight refresh policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub min_refresh_interval_secs: u64,
    pub lookback_days: u32,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: 900,
            lookback_days: 30,
        }
    }
}

impl InsightsConfig {
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }
}

/// Main configuration (`~/.vyapaar-saathi/config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_completion_api_url")]
    pub completion_api_url: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default)]
    pub live_sync: LiveSyncConfig,
    #[serde(default)]
    pub insights: InsightsConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_completion_api_url() -> String {
    DEFAULT_COMPLETION_API_URL.to_string()
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            completion_api_url: default_completion_api_url(),
            completion_model: default_completion_model(),
            live_sync: LiveSyncConfig::default(),
            insights: InsightsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `SAATHI_*` variables. Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = read("SAATHI_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = read("SAATHI_SUPABASE_URL") {
            self.supabase_url = value;
        }
        if let Some(value) = read("SAATHI_SUPABASE_KEY") {
            self.supabase_publishable_key = value;
        }
        if let Some(value) = read("SAATHI_AI_GATEWAY_URL") {
            self.completion_api_url = value;
        }
        if let Some(value) = read("SAATHI_AI_MODEL") {
            self.completion_model = value;
        }
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        Url::parse(&self.completion_api_url)?;
        if self.live_sync.throttle_ms == 0 || self.live_sync.expensive_throttle_ms == 0 {
            return Err(CoreError::Config(
                "live_sync throttle windows must be positive".to_string(),
            ));
        }
        if self.live_sync.idle_detection && self.live_sync.idle_threshold_secs == 0 {
            return Err(CoreError::Config(
                "live_sync.idle_threshold_secs must be positive".to_string(),
            ));
        }
        if self.insights.lookback_days == 0 {
            return Err(CoreError::Config(
                "insights.lookback_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.completion_model, "google/gemini-2.5-flash");
        assert_eq!(config.live_sync.throttle(), Duration::from_millis(1000));
        assert_eq!(config.live_sync.expensive_throttle(), Duration::from_millis(2000));
        assert_eq!(config.live_sync.idle_threshold(), Some(Duration::from_secs(300)));
        assert_eq!(config.insights.min_refresh_interval(), Duration::from_secs(900));
        assert_eq!(config.insights.lookback_days, 30);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "live_sync": { "idle_detection": false } }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.live_sync.idle_threshold(), None);
        assert_eq!(config.live_sync.throttle_ms, 1000);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.live_sync.throttle_ms = 1500;
        config.insights.lookback_days = 7;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SAATHI_LOG_LEVEL", "trace"),
            ("SAATHI_SUPABASE_URL", "https://shop.supabase.co"),
            ("SAATHI_SUPABASE_KEY", "  "),
            ("SAATHI_AI_MODEL", "openai/gpt-4o-mini"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.supabase_url, "https://shop.supabase.co");
        assert_eq!(config.supabase_publishable_key, DEFAULT_SUPABASE_PUBLISHABLE_KEY);
        assert_eq!(config.completion_model, "openai/gpt-4o-mini");
        assert_eq!(config.completion_api_url, DEFAULT_COMPLETION_API_URL);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        config.supabase_url = "not a valid url".to_string();
        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));

        let mut config = Config::default();
        config.live_sync.throttle_ms = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = Config::default();
        config.live_sync.idle_detection = false;
        config.live_sync.idle_threshold_secs = 0;
        config.validate().unwrap();
    }
}
