//! Stream identity tags.

use boxio_shared::constants::streams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which stdio direction a byte stream belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamType {
    /// Stable name, also used as the pipe file name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Stdin => streams::STDIN,
            StreamType::Stdout => streams::STDOUT,
            StreamType::Stderr => streams::STDERR,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
