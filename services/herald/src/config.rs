//! Configuration types for the herald service

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HeraldError;

static SECRET_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("secret reference regex is valid")
});

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub notifiers: Vec<NotifierSettings>,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Operator settings overlaid on a notifier's self-registered record
///
/// Fields left out keep the notifier's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifierSettings {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_template: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl NotifierSettings {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }
}

/// Extension loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_extensions_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_handshake_timeout", with = "humantime_serde")]
    pub handshake_timeout: Duration,
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_extensions_directory(),
            handshake_timeout: default_handshake_timeout(),
            call_timeout: default_call_timeout(),
        }
    }
}

/// Remote extension catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_catalog_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            timeout: default_catalog_timeout(),
        }
    }
}

/// Dispatch fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    pub send_timeout: Duration,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout: default_send_timeout(),
            history_size: default_history_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_extensions_directory() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_catalog_url() -> String {
    "https://raw.githubusercontent.com/hunterlong/statup/master/plugins.json".to_string()
}

fn default_catalog_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_history_size() -> usize {
    100
}

impl Config {
    /// Reject settings that name the same notifier twice
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for settings in &self.notifiers {
            if settings.method.trim().is_empty() {
                return Err(HeraldError::Config(
                    "notifier settings without a method".to_string(),
                ));
            }
            if !seen.insert(settings.method.as_str()) {
                return Err(HeraldError::Config(format!(
                    "notifier '{}' is configured more than once",
                    settings.method
                )));
            }
        }
        Ok(())
    }

    /// Replace `${VAR}` references in notifier values from the environment
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        self.resolve_secrets_with(|name| std::env::var(name).ok())
    }

    /// Replace `${VAR}` references using `lookup`
    pub fn resolve_secrets_with<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for settings in &mut self.notifiers {
            for (key, value) in settings.values.iter_mut() {
                let mut missing = None;
                let resolved = SECRET_REF.replace_all(value, |caps: &regex::Captures<'_>| {
                    lookup(&caps[1]).unwrap_or_else(|| {
                        missing.get_or_insert_with(|| caps[1].to_string());
                        String::new()
                    })
                });
                if let Some(var) = missing {
                    return Err(HeraldError::Config(format!(
                        "{}.{} references unset environment variable {}",
                        settings.method, key, var
                    )));
                }
                *value = resolved.into_owned();
            }
        }
        Ok(())
    }
}

/// Load and validate configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        HeraldError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
