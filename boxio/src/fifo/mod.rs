//! Named-pipe set provisioning.
//!
//! A [`FifoSet`] is the on-disk triple of pipes a container's stdio is wired
//! to. [`new_fifos`] creates it below `<root>/io/<id>`; the caller owns its
//! removal once the container is gone.

pub mod pipes;

use crate::stream::StreamType;
use boxio_shared::constants::perms;
use boxio_shared::errors::{BoxioError, BoxioResult};
use boxio_shared::layout::IoLayout;
use nix::sys::stat::Mode;
use serde::{Deserialize, Serialize};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use pipes::{HostPipe, StdinPipe, StdioPipes};

/// Paths of one container's stdio pipes.
///
/// A `None` path means the direction is disabled and must never be opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FifoSet {
    /// Per-container directory holding the pipes.
    pub dir: PathBuf,
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    /// Always `None` when `terminal` is set: stdout carries combined output.
    pub stderr: Option<PathBuf>,
    pub terminal: bool,
}

/// Serialisable description of a [`FifoSet`], handed to the runtime's stdio
/// connector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioConfig {
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub terminal: bool,
}

impl FifoSet {
    /// Describe the set already provisioned for container `id` under `root`.
    ///
    /// Directions whose pipe is missing are disabled; a missing stderr pipe
    /// means the set was created for a tty.
    pub fn load(root: impl AsRef<Path>, id: &str) -> BoxioResult<FifoSet> {
        validate_id(id)?;

        let layout = IoLayout::new(root.as_ref());
        let dir = layout.container_dir(id);
        let meta = std::fs::metadata(&dir).map_err(|e| BoxioError::provision(&dir, e))?;
        if !meta.is_dir() {
            return Err(BoxioError::provision(
                &dir,
                io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }

        let existing = |path: PathBuf| is_fifo(&path).then_some(path);
        let stdout = existing(layout.stdout_path(id));
        if stdout.is_none() {
            return Err(BoxioError::provision(
                layout.stdout_path(id),
                io::Error::new(io::ErrorKind::NotFound, "stdout fifo missing"),
            ));
        }
        let stderr = existing(layout.stderr_path(id));

        Ok(FifoSet {
            stdin: existing(layout.stdin_path(id)),
            stdout,
            terminal: stderr.is_none(),
            stderr,
            dir,
        })
    }

    /// Path for `stream`, if that direction is enabled.
    pub fn path(&self, stream: StreamType) -> Option<&Path> {
        match stream {
            StreamType::Stdin => self.stdin.as_deref(),
            StreamType::Stdout => self.stdout.as_deref(),
            StreamType::Stderr => self.stderr.as_deref(),
        }
    }

    /// Connector-facing description of this set.
    pub fn config(&self) -> StdioConfig {
        StdioConfig {
            stdin: self.stdin.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            terminal: self.terminal,
        }
    }

    /// Remove the per-container directory and every pipe in it.
    ///
    /// A directory that is already gone is not an error.
    pub fn remove(&self) -> BoxioResult<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "Removed fifo set");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BoxioError::provision(&self.dir, e)),
        }
    }
}

/// Create the FIFO set for container `id` under `<root>/io/<id>`.
///
/// Safe to call again for the same container: an existing directory and
/// existing pipes are reused, and pipes of directions the new settings
/// disable are removed. `tty` collapses stdout and stderr into one pipe,
/// and with `stdin == false` no stdin pipe is created and the returned set has
/// no stdin path.
///
/// # Errors
///
/// - `InvalidArgument` if `id` is not a single path component
/// - `Provision` if the directory or a pipe cannot be created; the original
///   OS error is kept as the source
pub fn new_fifos(
    root: impl AsRef<Path>,
    id: &str,
    tty: bool,
    stdin: bool,
) -> BoxioResult<FifoSet> {
    validate_id(id)?;

    let layout = IoLayout::new(root.as_ref());
    let dir = layout.container_dir(id);
    create_private_dir(&dir)?;

    // Pipes left by an earlier provisioning with other settings must go, or a
    // later `FifoSet::load` would enable a direction this set disabled.
    let stdin_path = if stdin {
        Some(make_fifo(layout.stdin_path(id))?)
    } else {
        remove_stale_fifo(&layout.stdin_path(id))?;
        None
    };
    let stdout_path = make_fifo(layout.stdout_path(id))?;
    let stderr_path = if tty {
        remove_stale_fifo(&layout.stderr_path(id))?;
        None
    } else {
        Some(make_fifo(layout.stderr_path(id))?)
    };

    info!(
        id = %id,
        dir = %dir.display(),
        tty,
        stdin,
        "Provisioned fifo set"
    );

    Ok(FifoSet {
        dir,
        stdin: stdin_path,
        stdout: Some(stdout_path),
        stderr: stderr_path,
        terminal: tty,
    })
}

fn validate_id(id: &str) -> BoxioResult<()> {
    if id.is_empty() {
        return Err(BoxioError::InvalidArgument(
            "container id must not be empty".into(),
        ));
    }
    if id == "." || id == ".." || id.contains('/') || id.contains('\0') {
        return Err(BoxioError::InvalidArgument(format!(
            "container id '{}' is not a single path component",
            id
        )));
    }
    Ok(())
}

fn is_fifo(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false)
}

fn create_private_dir(dir: &Path) -> BoxioResult<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(perms::IO_DIR_MODE)
        .create(dir)
        .map_err(|e| BoxioError::provision(dir, e))
}

/// Remove a pipe of a disabled direction. Anything that is not a FIFO is left alone.
fn remove_stale_fifo(path: &Path) -> BoxioResult<()> {
    if !is_fifo(path) {
        return Ok(());
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale fifo");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BoxioError::provision(path, e)),
    }
}

/// Create one named pipe, accepting a FIFO that already exists at `path`.
fn make_fifo(path: PathBuf) -> BoxioResult<PathBuf> {
    match nix::unistd::mkfifo(&path, Mode::from_bits_truncate(perms::FIFO_MODE)) {
        Ok(()) => {
            debug!(path = %path.display(), "Created fifo");
            Ok(path)
        }
        Err(nix::errno::Errno::EEXIST) => {
            let meta = std::fs::symlink_metadata(&path)
                .map_err(|e| BoxioError::provision(&path, e))?;
            if meta.file_type().is_fifo() {
                debug!(path = %path.display(), "Reusing existing fifo");
                Ok(path)
            } else {
                Err(BoxioError::provision(
                    &path,
                    io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a fifo"),
                ))
            }
        }
        Err(errno) => Err(BoxioError::provision(&path, io::Error::from(errno))),
    }
}
