#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub struct TestContext {
    pub cmd: Command,
    // Removed when the test is done
    pub home: TempDir,
}

impl TestContext {
    /// Command sharing this context's home dir
    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_boxio");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(30));
        cmd.env_remove("BOXIO_HOME");
        cmd.arg("--home").arg(self.home.path());
        cmd
    }

    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.home.path().join("io").join(id)
    }

    pub fn provision(&self, id: &str, flags: &[&str]) -> serde_json::Value {
        let output = self
            .new_cmd()
            .arg("provision")
            .arg(id)
            .args(flags)
            .output()
            .expect("run boxio provision");
        assert!(
            output.status.success(),
            "provision failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("provision prints json")
    }
}

pub fn boxio() -> TestContext {
    let home = TempDir::new().expect("create temp home");
    let bin_path = env!("CARGO_BIN_EXE_boxio");

    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("BOXIO_HOME");
    cmd.arg("--home").arg(home.path());

    TestContext { cmd, home }
}

pub fn path_of(value: &serde_json::Value, key: &str) -> Option<PathBuf> {
    value[key].as_str().map(|s| Path::new(s).to_path_buf())
}
