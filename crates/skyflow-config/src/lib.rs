//! Configuration management for SkyFlow
//!
//! Locates the stack file holding resource declarations and loads the
//! engine [`Settings`].

pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{LocalSettings, PARALLELISM_ENV, RetrySettings, Settings};

use std::path::{Path, PathBuf};
use tracing::debug;

pub const STACK_PATH_ENV: &str = "SKYFLOW_STACK_PATH";
pub const CONFIG_PATH_ENV: &str = "SKYFLOW_CONFIG_PATH";

/// Project-local directory for settings, state and stack files
pub const PROJECT_DIR: &str = ".skyflow";

const STACK_CANDIDATES: [&str; 4] = ["stack.local.yaml", "stack.yaml", "stack.yml", "stack.json"];

/// Global configuration directory (`~/.config/skyflow`), created on demand
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("skyflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the stack file for the current directory.
///
/// Search order:
/// 1. `SKYFLOW_STACK_PATH`
/// 2. current directory: stack.local.yaml, stack.yaml, stack.yml, stack.json
/// 3. `./.skyflow/`, same order
pub fn find_stack_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_stack_file_in(&current_dir)
}

/// [`find_stack_file`] rooted at `dir` instead of the current directory
pub fn find_stack_file_in(dir: &Path) -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var(STACK_PATH_ENV) {
        let path = PathBuf::from(stack_path);
        if path.exists() {
            debug!(path = %path.display(), "Stack file from {}", STACK_PATH_ENV);
            return Ok(path);
        }
    }

    let search_dirs = [dir.to_path_buf(), dir.join(PROJECT_DIR)];
    for search_dir in search_dirs.iter().filter(|d| d.is_dir()) {
        for filename in &STACK_CANDIDATES {
            let path = search_dir.join(filename);
            if path.exists() {
                debug!(path = %path.display(), "Found stack file");
                return Ok(path);
            }
        }
    }

    Err(ConfigError::StackFileNotFound)
}

/// Directory a stack file belongs to. Files inside `.skyflow/` belong to
/// the directory above it.
pub fn project_root_of(stack_file: &Path) -> PathBuf {
    let parent = stack_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    match parent.file_name() {
        Some(name) if name == PROJECT_DIR => parent
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
        _ => parent.to_path_buf(),
    }
}

/// Find the settings file for `project_root`, if any.
///
/// Search order:
/// 1. `SKYFLOW_CONFIG_PATH`
/// 2. `skyflow.yaml`, then `.skyflow/config.yaml` in the project root
/// 3. `~/.config/skyflow/config.yaml`
pub fn find_settings_file(project_root: &Path) -> Option<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
    }

    let local = [
        project_root.join("skyflow.yaml"),
        project_root.join(PROJECT_DIR).join("config.yaml"),
    ];
    if let Some(path) = local.into_iter().find(|p| p.exists()) {
        return Some(path);
    }

    dirs::config_dir()
        .map(|dir| dir.join("skyflow").join("config.yaml"))
        .filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("skyflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stack.yaml"), "resources: []").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_stack_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("stack.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_stack_file_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("stack.yaml"), "resources: []").unwrap();
        fs::write(temp_dir.path().join("stack.json"), "{\"resources\": []}").unwrap();
        fs::write(temp_dir.path().join("stack.local.yaml"), "resources: []").unwrap();

        let result = find_stack_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with("stack.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_stack_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(PROJECT_DIR);
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("stack.yml"), "resources: []").unwrap();

        let result = find_stack_file_in(temp_dir.path()).unwrap();
        assert!(result.ends_with(".skyflow/stack.yml"));
        assert_eq!(project_root_of(&result), temp_dir.path());
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stack_path = temp_dir.path().join("custom.json");
        fs::write(&stack_path, "{\"resources\": []}").unwrap();

        unsafe {
            std::env::set_var(STACK_PATH_ENV, stack_path.to_str().unwrap());
        }
        let result = find_stack_file_in(Path::new("/nonexistent"));
        unsafe {
            std::env::remove_var(STACK_PATH_ENV);
        }

        assert_eq!(result.unwrap(), stack_path);
    }

    #[test]
    #[serial]
    fn test_find_stack_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result = find_stack_file_in(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::StackFileNotFound)));
    }

    #[test]
    #[serial]
    fn test_settings_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(PROJECT_DIR);
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("config.yaml"), "parallelism: 3").unwrap();

        assert_eq!(
            find_settings_file(temp_dir.path()),
            Some(project_dir.join("config.yaml"))
        );

        fs::write(temp_dir.path().join("skyflow.yaml"), "parallelism: 2").unwrap();
        assert_eq!(
            find_settings_file(temp_dir.path()),
            Some(temp_dir.path().join("skyflow.yaml"))
        );

        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, "parallelism: 1").unwrap();
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, custom.to_str().unwrap());
        }
        let from_env = find_settings_file(temp_dir.path());
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        assert_eq!(from_env, Some(custom));
    }

    #[test]
    fn test_project_root_of() {
        assert_eq!(
            project_root_of(Path::new("/work/app/stack.yaml")),
            PathBuf::from("/work/app")
        );
        assert_eq!(
            project_root_of(Path::new("/work/app/.skyflow/stack.yaml")),
            PathBuf::from("/work/app")
        );
        assert_eq!(project_root_of(Path::new("stack.yaml")), PathBuf::from("."));
    }
}
