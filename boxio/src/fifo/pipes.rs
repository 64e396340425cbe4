//! Host side of a FIFO set.
//!
//! Opening never blocks on the container. Output readers are opened
//! non-blocking and stay pending until the container writes or hangs up. The
//! stdin writer is opened write-only, which the kernel refuses (`ENXIO`) while
//! the container has no reader yet; such a pipe is returned as
//! [`StdinPipe::Pending`] and connected by the stdin copy task. Holding a
//! write-only descriptor means a container that closes its stdin surfaces as
//! `EPIPE` on the next write.

use super::FifoSet;
use crate::stream::StreamType;
use boxio_shared::errors::{BoxioError, BoxioResult};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::unix::pipe;
use tracing::debug;

const CONNECT_POLL_MIN: Duration = Duration::from_millis(5);
const CONNECT_POLL_MAX: Duration = Duration::from_millis(100);

/// An open host-side pipe handle. Dropping it closes the descriptor.
#[derive(Debug)]
pub enum HostPipe {
    /// Writer into the container's stdin.
    Stdin(pipe::Sender),
    /// Reader of the container's stdout or stderr.
    Output(pipe::Receiver),
}

/// Host end of the container's stdin.
#[derive(Debug)]
pub enum StdinPipe {
    /// The container's reader was present at open time.
    Connected(pipe::Sender),
    /// No reader yet.
    Pending(PathBuf),
}

impl StdinPipe {
    /// Writer into the container's stdin, waiting for its reader if needed.
    ///
    /// Polls with a capped backoff; drop the future to give up.
    pub async fn connect(self) -> io::Result<pipe::Sender> {
        let path = match self {
            StdinPipe::Connected(sender) => return Ok(sender),
            StdinPipe::Pending(path) => path,
        };

        let mut delay = CONNECT_POLL_MIN;
        loop {
            if let Some(sender) = try_open_sender(&path)? {
                debug!(path = %path.display(), "Container stdin reader connected");
                return Ok(sender);
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(CONNECT_POLL_MAX);
        }
    }
}

/// Open handles for every enabled direction of a [`FifoSet`].
#[derive(Debug, Default)]
pub struct StdioPipes {
    pub stdin: Option<StdinPipe>,
    pub stdout: Option<pipe::Receiver>,
    pub stderr: Option<pipe::Receiver>,
}

impl StdioPipes {
    /// Open every path present in `fifos`.
    ///
    /// Must be called from within a tokio runtime. On failure, handles opened
    /// so far are closed before the error is returned.
    pub fn open(fifos: &FifoSet) -> BoxioResult<Self> {
        let mut pipes = StdioPipes::default();

        if let Some(path) = &fifos.stdin {
            pipes.stdin = Some(open_stdin(path)?);
        }
        if let Some(path) = &fifos.stdout {
            pipes.stdout = Some(open_receiver(StreamType::Stdout, path)?);
        }
        if let Some(path) = &fifos.stderr {
            pipes.stderr = Some(open_receiver(StreamType::Stderr, path)?);
        }

        Ok(pipes)
    }
}

/// Write-only, non-blocking open. `None` while the FIFO has no reader.
fn try_open_sender(path: &Path) -> io::Result<Option<pipe::Sender>> {
    match pipe::OpenOptions::new().open_sender(path) {
        Ok(sender) => Ok(Some(sender)),
        Err(e) if e.raw_os_error() == Some(nix::errno::Errno::ENXIO as i32) => Ok(None),
        Err(e) => Err(e),
    }
}

fn open_stdin(path: &Path) -> BoxioResult<StdinPipe> {
    let stdin = match try_open_sender(path) {
        Ok(Some(sender)) => StdinPipe::Connected(sender),
        Ok(None) => StdinPipe::Pending(path.to_path_buf()),
        Err(e) => return Err(BoxioError::pipe(StreamType::Stdin.as_str(), path, e)),
    };
    debug!(
        path = %path.display(),
        connected = matches!(stdin, StdinPipe::Connected(_)),
        "Opened stdin pipe"
    );
    Ok(stdin)
}

fn open_receiver(stream: StreamType, path: &Path) -> BoxioResult<pipe::Receiver> {
    let receiver = pipe::OpenOptions::new()
        .open_receiver(path)
        .map_err(|e| BoxioError::pipe(stream.as_str(), path, e))?;
    debug!(stream = %stream, path = %path.display(), "Opened output pipe");
    Ok(receiver)
}
