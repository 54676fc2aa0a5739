//! Discovery and handshake of extension artifacts

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ExtensionNotifier;
use crate::config::ExtensionsConfig;
use crate::error::HeraldError;
use crate::io::ExtensionRunner;
use crate::notifier::{NotificationConfig, Notifier};
use crate::registry::{LoadedExtension, NotifierRegistry};

/// File-name suffix an artifact must carry to be considered
pub const EXTENSION_SUFFIX: &str = "notifier";

/// Symbol an artifact must report in its handshake
pub const EXPORTED_SYMBOL: &str = "Notifier";

/// Handshake protocol version the host speaks
pub const EXTENSION_ABI_VERSION: u32 = 1;

/// Reply to `<artifact> describe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub abi_version: u32,
    pub symbol: String,
    pub config: NotificationConfig,
}

/// An artifact that was a candidate but could not be loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionFailure {
    pub artifact: PathBuf,
    pub reason: String,
}

/// What one directory scan did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub loaded: Vec<LoadedExtension>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<ExtensionFailure>,
}

/// Whether `path` names an extension artifact
///
/// The file name must have exactly one `.` and end in [`EXTENSION_SUFFIX`].
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let parts: Vec<&str> = name.split('.').collect();
    matches!(parts.as_slice(), [stem, suffix] if !stem.is_empty() && *suffix == EXTENSION_SUFFIX)
}

/// Loads extension artifacts and registers them
pub struct ExtensionLoader {
    runner: Arc<dyn ExtensionRunner>,
    handshake_timeout: Duration,
    call_timeout: Duration,
}

impl ExtensionLoader {
    pub fn new(runner: Arc<dyn ExtensionRunner>, config: &ExtensionsConfig) -> Self {
        Self {
            runner,
            handshake_timeout: config.handshake_timeout,
            call_timeout: config.call_timeout,
        }
    }

    /// Run the handshake for one artifact
    pub async fn load(&self, artifact: &Path) -> crate::Result<ExtensionNotifier> {
        let failure = |reason: String| HeraldError::LoadFailure {
            artifact: artifact.to_path_buf(),
            reason,
        };

        let stdout = self
            .runner
            .run(artifact, "describe", "", self.handshake_timeout)
            .await
            .map_err(|e| failure(e.to_string()))?;
        let handshake: Handshake = serde_json::from_str(stdout.trim())
            .map_err(|e| failure(format!("unreadable handshake: {}", e)))?;

        if handshake.symbol != EXPORTED_SYMBOL {
            return Err(failure(format!(
                "unexpected type from module symbol '{}'",
                handshake.symbol
            )));
        }
        if handshake.abi_version != EXTENSION_ABI_VERSION {
            return Err(failure(format!(
                "ABI version {} is not supported (expected {})",
                handshake.abi_version, EXTENSION_ABI_VERSION
            )));
        }
        if handshake.config.method.trim().is_empty() {
            return Err(failure("handshake config has no method".to_string()));
        }

        Ok(ExtensionNotifier::new(
            artifact.to_path_buf(),
            handshake.config,
            self.runner.clone(),
            self.call_timeout,
        ))
    }

    /// Scan `directory` and register every artifact that loads
    ///
    /// The directory is created if missing. Entries are visited in file-name
    /// order. Nothing here is fatal: problems end up in the report.
    pub async fn load_all(&self, directory: &Path, registry: &NotifierRegistry) -> LoadReport {
        let mut report = LoadReport::default();

        let entries = match read_sorted(directory).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    "Extensions directory {} was not usable: {}",
                    directory.display(),
                    e
                );
                report.failures.push(ExtensionFailure {
                    artifact: directory.to_path_buf(),
                    reason: e.to_string(),
                });
                return report;
            }
        };

        for (path, is_file) in entries {
            if !is_file || !is_candidate(&path) {
                tracing::debug!("Skipping {}: not an extension artifact", path.display());
                report.skipped.push(path);
                continue;
            }

            let result = match self.load(&path).await {
                Ok(notifier) => {
                    let config = notifier.select();
                    let loaded = LoadedExtension {
                        artifact: path.clone(),
                        method: config.method.clone(),
                        title: config.title.clone(),
                        author: config.author.clone(),
                    };
                    registry
                        .register_extension(Arc::new(notifier), loaded.clone())
                        .map(|()| loaded)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(loaded) => {
                    tracing::info!(
                        "Loaded extension '{}' from {}",
                        loaded.method,
                        path.display()
                    );
                    report.loaded.push(loaded);
                }
                Err(e) => {
                    tracing::warn!(
                        "Extension '{}' could not load correctly: {}",
                        path.display(),
                        e
                    );
                    let reason = match e {
                        HeraldError::LoadFailure { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    report.failures.push(ExtensionFailure {
                        artifact: path,
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            "Loaded {} extensions ({} skipped, {} failed)",
            report.loaded.len(),
            report.skipped.len(),
            report.failures.len()
        );
        report
    }
}

async fn read_sorted(directory: &Path) -> std::io::Result<Vec<(PathBuf, bool)>> {
    tokio::fs::create_dir_all(directory).await?;
    let mut dir = tokio::fs::read_dir(directory).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        // Follows symlinks, so a linked artifact counts as a file.
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        entries.push((path, is_file));
    }
    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(entries)
}
