use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::features::FeatureSet;
use crate::loader::PollBudget;
use crate::utils::paths::get_config_path;

/// Comma-separated feature flags merged into the configured set.
pub const FEATURES_ENV: &str = "VIEWER_HOST_FEATURES";

/// Feature flags enabled on this host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub enabled: FeatureSet,
}

/// Script and stylesheet loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Base url relative resource paths are resolved against
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_attempts() -> u32 {
    50
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ResourcesConfig {
    pub fn poll_budget(&self) -> PollBudget {
        PollBudget {
            attempts: self.poll_attempts,
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Comma-separated flags, as served by the feature-switch service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features_enabled: Option<String>,

    /// Catalog file used instead of the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Absent means the host has no feature configuration at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesConfig>,

    #[serde(default)]
    pub resources: ResourcesConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            features_enabled: None,
            catalog_path: None,
            log_level: default_log_level(),
            features: None,
            resources: ResourcesConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(HostConfig::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: HostConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Effective feature set.
    ///
    /// Merges `[features] enabled`, `features_enabled` and `env_override`.
    /// Returns `None` when none of them is set, so gated viewers stay hidden.
    pub fn feature_set(&self, env_override: Option<&str>) -> Option<FeatureSet> {
        let sources = [
            self.features.as_ref().map(|f| f.enabled.clone()),
            self.features_enabled.as_deref().map(FeatureSet::from_csv),
            env_override.map(FeatureSet::from_csv),
        ];

        sources.into_iter().flatten().reduce(|mut merged, next| {
            merged.extend(&next);
            merged
        })
    }

    /// `feature_set` with the `VIEWER_HOST_FEATURES` override from the environment.
    pub fn feature_set_from_env(&self) -> Option<FeatureSet> {
        let env_override = std::env::var(FEATURES_ENV).ok();
        self.feature_set(env_override.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.features, None);
        assert_eq!(config.resources.poll_budget(), PollBudget::default());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
        log_level = "debug"
        catalog_path = "/etc/viewers.json"

        [features]
        enabled = ["LOCATIONSERVICES"]

        [resources]
        base_url = "https://viewer.example.com/"
        poll_attempts = 10
        "#;

        let config: HostConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.catalog_path, Some(PathBuf::from("/etc/viewers.json")));
        assert!(config.features.unwrap().enabled.is_enabled("LOCATIONSERVICES"));
        assert_eq!(config.resources.poll_attempts, 10);
        assert_eq!(config.resources.poll_interval_ms, 100);
    }

    #[test]
    fn test_missing_features_fail_closed() {
        let config: HostConfig = toml::from_str(r#"log_level = "warn""#).unwrap();
        assert_eq!(config.feature_set(None), None);
    }

    #[test]
    fn test_feature_sources_merge() {
        let toml_str = r#"
        features_enabled = "GOVCLOUD, ALLOWUNSAFEEVAL"

        [features]
        enabled = ["LOCATIONSERVICES"]
        "#;
        let config: HostConfig = toml::from_str(toml_str).unwrap();

        let features = config.feature_set(Some("AUTHPROVIDER_COGNITO")).unwrap();
        let flags: Vec<&str> = features.iter().collect();
        assert_eq!(
            flags,
            vec!["ALLOWUNSAFEEVAL", "AUTHPROVIDER_COGNITO", "GOVCLOUD", "LOCATIONSERVICES"]
        );
    }

    #[test]
    fn test_empty_features_section_is_configured() {
        let config: HostConfig = toml::from_str("[features]").unwrap();
        let features = config.feature_set(None).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = HostConfig::default();
        config.features_enabled = Some("LOCATIONSERVICES".into());
        config.resources.request_timeout_secs = 5;
        config.save_to(&path).unwrap();

        let loaded = HostConfig::load_from(&path).unwrap();
        assert_eq!(loaded.features_enabled.as_deref(), Some("LOCATIONSERVICES"));
        assert_eq!(loaded.resources.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = HostConfig::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "log_level = [").unwrap();

        let err = HostConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_feature_set_from_env() {
        // SAFETY: Tests touching the environment are serialized
        unsafe {
            std::env::set_var(FEATURES_ENV, "LOCATIONSERVICES");
        }
        let features = HostConfig::default().feature_set_from_env();
        unsafe {
            std::env::remove_var(FEATURES_ENV);
        }

        assert!(features.unwrap().is_enabled("LOCATIONSERVICES"));
    }
}
