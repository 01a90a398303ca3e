//! Runtime configuration
//!
//! Settings merge in precedence order: built-in defaults, then the user
//! config at `~/.config/converge/config.toml`, then the project's
//! `converge.toml` next to the declaration documents, then command-line
//! flags. The loader skips `converge.toml` when reading declarations.

use anyhow::{Context, Result};
use converge_engine::RetryPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One config file's contents; every field optional so files can set
/// only what they care about
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub document_dir: Option<String>,
    pub state_path: Option<String>,
    pub jobs: Option<usize>,
    pub lock_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub strict_drift: Option<bool>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    fn overlay(&mut self, other: Self) {
        self.document_dir = other.document_dir.or(self.document_dir.take());
        self.state_path = other.state_path.or(self.state_path.take());
        self.jobs = other.jobs.or(self.jobs);
        self.lock_timeout_secs = other.lock_timeout_secs.or(self.lock_timeout_secs);
        self.max_retries = other.max_retries.or(self.max_retries);
        self.retry_base_ms = other.retry_base_ms.or(self.retry_base_ms);
        self.strict_drift = other.strict_drift.or(self.strict_drift);
    }
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Config {
    pub document_dir: PathBuf,
    pub state_path: PathBuf,
    pub jobs: usize,
    pub lock_timeout: Duration,
    pub retry: RetryPolicy,
    pub strict_drift: bool,
}

impl Config {
    /// Merge config files and command-line overrides
    pub fn load(cli_dir: Option<&Path>, cli_state: Option<&Path>) -> Result<Self> {
        let mut merged = FileConfig::default();
        if let Some(user) = user_config_path() {
            merged.overlay(FileConfig::load(&user)?);
        }

        // The document directory must be settled before the project config
        // can be found; flags beat the user config.
        let document_dir = cli_dir.map_or_else(
            || expand(merged.document_dir.as_deref().unwrap_or(".")),
            Path::to_path_buf,
        );
        let mut project = FileConfig::load(&document_dir.join(converge_document::PROJECT_CONFIG_FILE))?;
        project.document_dir = None;
        merged.overlay(project);

        let state_path = cli_state.map_or_else(
            || {
                let raw = expand(merged.state_path.as_deref().unwrap_or("converge.state.json"));
                if raw.is_absolute() {
                    raw
                } else {
                    document_dir.join(raw)
                }
            },
            Path::to_path_buf,
        );

        let retry_default = RetryPolicy::default();
        Ok(Self {
            document_dir,
            state_path,
            jobs: merged.jobs.unwrap_or(4),
            lock_timeout: Duration::from_secs(merged.lock_timeout_secs.unwrap_or(10)),
            retry: RetryPolicy {
                max_retries: merged.max_retries.unwrap_or(retry_default.max_retries),
                base_delay: merged
                    .retry_base_ms
                    .map_or(retry_default.base_delay, Duration::from_millis),
            },
            strict_drift: merged.strict_drift.unwrap_or(false),
        })
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("converge").join("config.toml"))
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
