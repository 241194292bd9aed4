//! TOML-based engine configuration.
//!
//! Covers the external service endpoints, dispatcher limits, and
//! gamification tuning. Stored at `~/.config/vitalink/config.toml`
//! (`vitalink-dev` when `VITALINK_ENV=dev`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::dispatch::{DISPATCH_BATCH_LIMIT, PENDING_MAX_AGE_DAYS, SEED_PREFIXES};
use crate::patient::DEFAULT_WEEKLY_GOAL;
use crate::storage::data_dir;

/// External service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_nlp_base_url")]
    pub nlp_base_url: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
}

/// Dispatcher limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    #[serde(default = "default_pending_max_age_days")]
    pub pending_max_age_days: i64,
    /// Destination prefixes treated as internal seed accounts.
    #[serde(default = "default_seed_prefixes")]
    pub seed_prefixes: Vec<String>,
}

/// Gamification tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationConfig {
    #[serde(default = "default_weekly_goal")]
    pub weekly_goal: u32,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/vitalink/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub gamification: GamificationConfig,
}

// Default functions
fn default_nlp_base_url() -> String {
    "http://localhost:8700".into()
}
fn default_gateway_url() -> String {
    "http://localhost:8701/send".into()
}
fn default_batch_limit() -> u32 {
    DISPATCH_BATCH_LIMIT
}
fn default_pending_max_age_days() -> i64 {
    PENDING_MAX_AGE_DAYS
}
fn default_seed_prefixes() -> Vec<String> {
    SEED_PREFIXES.iter().map(|s| s.to_string()).collect()
}
fn default_weekly_goal() -> u32 {
    DEFAULT_WEEKLY_GOAL
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            nlp_base_url: default_nlp_base_url(),
            gateway_url: default_gateway_url(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            pending_max_age_days: default_pending_max_age_days(),
            seed_prefixes: default_seed_prefixes(),
        }
    }
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            weekly_goal: default_weekly_goal(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: ServicesConfig::default(),
            dispatch: DispatchConfig::default(),
            gamification: GamificationConfig::default(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        match current {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.dispatch.batch_limit, DISPATCH_BATCH_LIMIT);
        assert_eq!(parsed.gamification.weekly_goal, DEFAULT_WEEKLY_GOAL);
    }

    #[test]
    fn empty_toml_fills_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.dispatch.pending_max_age_days, PENDING_MAX_AGE_DAYS);
        assert!(!parsed.services.nlp_base_url.is_empty());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let parsed: Config = toml::from_str(
            "[dispatch]\nbatch_limit = 10\n",
        )
        .unwrap();
        assert_eq!(parsed.dispatch.batch_limit, 10);
        assert_eq!(parsed.dispatch.pending_max_age_days, PENDING_MAX_AGE_DAYS);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(
            cfg.get("dispatch.batch_limit").as_deref(),
            Some("50")
        );
        assert!(cfg.get("dispatch.missing_key").is_none());
    }

    #[test]
    fn save_and_load_under_temp_home() {
        let dir = tempfile::tempdir().unwrap();
        let previous_home = std::env::var_os("HOME");
        std::env::set_var("HOME", dir.path());
        std::env::set_var("VITALINK_ENV", "dev");

        let mut cfg = Config::default();
        cfg.dispatch.batch_limit = 7;
        cfg.save().unwrap();
        let loaded = Config::load().unwrap();
        assert_eq!(loaded.dispatch.batch_limit, 7);

        match previous_home {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
        std::env::remove_var("VITALINK_ENV");
    }
}
