//! Error types shared by every boxio crate.
//!
//! Provisioning and pipe failures keep the original [`io::Error`] as their
//! source so callers can still match on the OS error kind.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout boxio.
pub type BoxioResult<T> = Result<T, BoxioError>;

/// Errors produced by the stdio attach core.
#[derive(Debug, Error)]
pub enum BoxioError {
    /// Creating the io directory or one of its named pipes failed.
    #[error("provision {}: {source}", path.display())]
    Provision {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Opening the host side of a named pipe failed.
    #[error("open {stream} pipe {}: {source}", path.display())]
    Pipe {
        stream: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Releasing a resource failed. Reported, never fatal.
    #[error("release {resource}: {source}")]
    Release {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be used.
    #[error("config: {0}")]
    Config(String),

    /// Unexpected internal condition.
    #[error("internal: {0}")]
    Internal(String),
}

impl BoxioError {
    /// Create a provisioning error for `path`.
    pub fn provision(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Provision {
            path: path.into(),
            source,
        }
    }

    /// Create a pipe open error.
    pub fn pipe(stream: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Pipe {
            stream,
            path: path.into(),
            source,
        }
    }

    /// OS error kind of the underlying failure, if there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Provision { source, .. }
            | Self::Pipe { source, .. }
            | Self::Release { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
