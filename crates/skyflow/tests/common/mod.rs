use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway project directory with its own HOME, so no global
/// settings leak into the run.
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_stack(&self, content: &str) {
        fs::write(self.root.path().join("stack.yaml"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_settings(&self, content: &str) {
        fs::write(self.root.path().join("skyflow.yaml"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    #[allow(dead_code)]
    pub fn read(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.file(name)).ok()
    }

    pub fn sky(&self) -> Command {
        sky_in(self.root.path())
    }
}

pub fn sky_in(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sky").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("SKYFLOW_STACK_PATH")
        .env_remove("SKYFLOW_CONFIG_PATH")
        .env_remove("SKYFLOW_PARALLELISM")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[allow(dead_code)]
pub const TWO_FILES: &str = r#"
resources:
  - kind: null_resource
    name: build
    attributes:
      triggers:
        version: "1"
  - kind: local_file
    name: motd
    attributes:
      filename: motd.txt
      content: "build ${null_resource.build.id}"
"#;
