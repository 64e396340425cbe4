//! Filesystem layout for per-container stdio directories.
//!
//! ```text
//! {root}/
//! └── io/
//!     └── {id}/             # owner-only (0700)
//!         ├── stdin         # absent when stdin is disabled
//!         ├── stdout
//!         └── stderr        # absent when a tty is in use
//! ```

use crate::constants::streams;
use std::path::PathBuf;

/// Directory names.
pub mod dirs {
    /// Parent of every per-container io directory
    pub const IO: &str = "io";
}

/// Layout of the io tree below a provisioner root.
#[derive(Clone, Debug)]
pub struct IoLayout {
    root: PathBuf,
}

impl IoLayout {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Io directory: {root}/io
    pub fn io_dir(&self) -> PathBuf {
        self.root.join(dirs::IO)
    }

    /// Per-container directory: {root}/io/{id}
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.io_dir().join(id)
    }

    /// Stdin pipe: {root}/io/{id}/stdin
    pub fn stdin_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(streams::STDIN)
    }

    /// Stdout pipe: {root}/io/{id}/stdout
    pub fn stdout_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(streams::STDOUT)
    }

    /// Stderr pipe: {root}/io/{id}/stderr
    pub fn stderr_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(streams::STDERR)
    }
}
