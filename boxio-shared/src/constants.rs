//! Shared constants between the attach core and the CLI
//!
//! These must stay identical on both sides because the CLI re-opens FIFO
//! sets created by a library caller.

/// Stream file names inside a per-container io directory.
pub mod streams {
    /// Client-to-container input pipe
    pub const STDIN: &str = "stdin";

    /// Container output pipe (combined output when a tty is in use)
    pub const STDOUT: &str = "stdout";

    /// Container error pipe (absent when a tty is in use)
    pub const STDERR: &str = "stderr";
}

/// Permission bits for provisioned paths.
pub mod perms {
    /// Per-container io directory: owner-only
    pub const IO_DIR_MODE: u32 = 0o700;

    /// Named pipes inside the io directory: owner read/write
    pub const FIFO_MODE: u32 = 0o600;
}

/// Copy loop tuning.
pub mod copy {
    /// Default buffer size for one stream copy task (32 KiB, same as io.Copy)
    pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
}

/// Environment variables understood by boxio.
pub mod envs {
    /// Overrides the default home directory (`~/.boxio`)
    pub const BOXIO_HOME: &str = "BOXIO_HOME";
}
