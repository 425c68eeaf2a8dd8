//! Project context shared by the commands

use anyhow::Context;
use skyflow_config::{ConfigError, Settings};
use skyflow_core::DeclarationSet;
use skyflow_engine::{
    ExecuteOptions, FileStateStore, ProviderRegistry, RetryConfig, StateSnapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct Project {
    pub root: PathBuf,
    pub stack_file: Option<PathBuf>,
    pub settings: Settings,
}

impl Project {
    /// Locate the stack file (or use `stack`) and load the settings next
    /// to it.
    pub fn discover(stack: Option<&Path>) -> anyhow::Result<Self> {
        let stack_file = match stack {
            Some(path) => path.to_path_buf(),
            None => skyflow_config::find_stack_file()?,
        };
        Self::load(skyflow_config::project_root_of(&stack_file), Some(stack_file))
    }

    /// Like [`Project::discover`], but a missing stack file falls back to
    /// the current directory. State commands work without declarations.
    pub fn discover_for_state(stack: Option<&Path>) -> anyhow::Result<Self> {
        match Self::discover(stack) {
            Err(e) if matches!(e.downcast_ref::<ConfigError>(), Some(ConfigError::StackFileNotFound)) => {
                Self::load(std::env::current_dir()?, None)
            }
            other => other,
        }
    }

    fn load(root: PathBuf, stack_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = Settings::load(&root)
            .with_context(|| format!("Failed to load settings for {}", root.display()))?;
        debug!(root = %root.display(), ?stack_file, "Project loaded");
        Ok(Self {
            root,
            stack_file,
            settings,
        })
    }

    pub fn declarations(&self) -> anyhow::Result<DeclarationSet> {
        let path = self
            .stack_file
            .as_deref()
            .ok_or(ConfigError::StackFileNotFound)?;
        let declarations = skyflow_core::load_declarations(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(declarations)
    }

    pub fn providers(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        skyflow_provider_local::register(&mut registry, self.settings.local_root_in(&self.root));
        registry
    }

    pub fn state_dir(&self) -> PathBuf {
        self.settings.state_dir_in(&self.root)
    }

    /// Read state without taking the lock.
    pub async fn snapshot(&self) -> anyhow::Result<StateSnapshot> {
        let snapshot = skyflow_engine::load_snapshot(self.state_dir())
            .await
            .context("Failed to read state")?;
        Ok(snapshot)
    }

    /// Open and lock the state store for a mutating run.
    pub async fn open_store(&self) -> anyhow::Result<Arc<FileStateStore>> {
        let store = FileStateStore::open(self.state_dir())
            .await
            .context("Failed to open state")?;
        Ok(Arc::new(store))
    }

    pub fn retry(&self) -> RetryConfig {
        let retry = &self.settings.retry;
        RetryConfig {
            max_attempts: retry.max_attempts,
            initial_delay: retry.initial_delay(),
            max_delay: retry.max_delay(),
            backoff_multiplier: retry.backoff_multiplier,
        }
    }

    pub fn execute_options(&self, parallelism: Option<usize>) -> ExecuteOptions {
        ExecuteOptions {
            parallelism: parallelism.unwrap_or(self.settings.parallelism).max(1),
            retry: self.retry(),
        }
    }
}
