//! Configuration for boxio.

use boxio_shared::constants::{copy as const_copy, envs as const_envs};
use boxio_shared::errors::{BoxioError, BoxioResult};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default home directory name below the user's home.
pub const BOXIO_DIR: &str = ".boxio";

/// Process-wide options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoxioOptions {
    /// Root of the io tree. FIFO sets live under `{home_dir}/io/{id}`.
    pub home_dir: PathBuf,

    /// Buffer size of each stream copy task, in bytes.
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Directory for rolling log files. `None` logs to stderr.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_copy_buffer_size() -> usize {
    const_copy::DEFAULT_BUFFER_SIZE
}

impl Default for BoxioOptions {
    fn default() -> Self {
        let home_dir = std::env::var(const_envs::BOXIO_HOME)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let mut path = home_dir().unwrap_or_else(|| PathBuf::from("."));
                path.push(BOXIO_DIR);
                path
            });

        Self {
            home_dir,
            copy_buffer_size: default_copy_buffer_size(),
            log_dir: None,
        }
    }
}

impl BoxioOptions {
    /// Options rooted at an explicit home directory.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            ..Default::default()
        }
    }

    /// Root directory handed to the FIFO provisioner.
    pub fn io_root(&self) -> &std::path::Path {
        &self.home_dir
    }

    /// Reject values the attach core cannot work with.
    pub fn validate(&self) -> BoxioResult<()> {
        if self.home_dir.as_os_str().is_empty() {
            return Err(BoxioError::Config("home_dir must not be empty".into()));
        }
        if self.copy_buffer_size == 0 {
            return Err(BoxioError::Config(
                "copy_buffer_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
