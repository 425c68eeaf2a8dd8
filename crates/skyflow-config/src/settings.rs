//! Engine settings
//!
//! ```yaml
//! parallelism: 8
//! retry:
//!   max_attempts: 5
//!   initial_delay_ms: 500
//! state_dir: .skyflow
//! local:
//!   root: ./out
//! ```
//!
//! Every key is optional. `SKYFLOW_PARALLELISM` overrides `parallelism`.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const PARALLELISM_ENV: &str = "SKYFLOW_PARALLELISM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Maximum number of provider calls in flight
    pub parallelism: usize,
    pub retry: RetrySettings,
    /// Directory holding `state.json`, relative to the project root
    pub state_dir: PathBuf,
    pub local: LocalSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: 4,
            retry: RetrySettings::default(),
            state_dir: PathBuf::from(".skyflow"),
            local: LocalSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Settings for the `local_file` provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalSettings {
    pub root: PathBuf,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Parse settings from YAML. An empty document yields the defaults.
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings for `project_root`, falling back to defaults when no
    /// settings file exists, then apply environment overrides.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut settings = match crate::find_settings_file(project_root) {
            Some(path) => {
                debug!(path = %path.display(), "Loading settings");
                let content = std::fs::read_to_string(&path)?;
                Self::from_yaml(&content, &path)?
            }
            None => Self::default(),
        };
        settings.apply_env()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(PARALLELISM_ENV) {
            self.parallelism = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: PARALLELISM_ENV.to_string(),
                reason: format!("'{}' is not a positive integer", value),
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(invalid("parallelism", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be at least 1.0"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.initial_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }

    /// State directory resolved against `project_root`
    pub fn state_dir_in(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.state_dir)
    }

    /// `local_file` root resolved against `project_root`
    pub fn local_root_in(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.local.root)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
