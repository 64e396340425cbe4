//! Attach/exec session coordination.
//!
//! ## Architecture
//!
//! - **Options** (mod.rs): caller endpoints and stdin policy of one session
//! - **Copy** (copy.rs): one task per stream direction
//! - **Closers** (closer.rs): release-once bookkeeping for pipe handles and
//!   caller-registered resources
//! - **Group** (group.rs): starts the copy tasks, waits for them, cancels
//!   them and releases everything on close

pub mod closer;
pub mod copy;
mod group;

pub use closer::{FnRelease, Release};
pub use copy::CopyOutcome;
pub use group::{AttachGroup, AttachState};

use boxio_shared::constants::copy as const_copy;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Client-side input source.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Client-side output sink. Shut down by its copy task when the stream ends.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

type CloseFn = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Capability to close the container side of stdin.
///
/// Clones share the same underlying callback, which runs at most once no
/// matter how many clones call [`StdinCloser::close`].
#[derive(Clone)]
pub struct StdinCloser {
    inner: Arc<Mutex<Option<CloseFn>>>,
}

impl StdinCloser {
    /// Wrap the runtime's close-stdin callback.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// Run the callback if it has not run yet.
    ///
    /// Returns `Ok(false)` when an earlier call already consumed it.
    pub fn close(&self) -> io::Result<bool> {
        let f = self.inner.lock().take();
        match f {
            Some(f) => f().map(|()| true),
            None => Ok(false),
        }
    }

    /// Whether the callback has been consumed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl fmt::Debug for StdinCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdinCloser")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// How to attach client endpoints to a container's pipes.
///
/// Consumed by [`AttachGroup::start`]; immutable for the session.
pub struct AttachOptions {
    pub(crate) stdin: Option<BoxedReader>,
    pub(crate) stdout: BoxedWriter,
    pub(crate) stderr: Option<BoxedWriter>,
    pub(crate) tty: bool,
    pub(crate) stdin_once: bool,
    pub(crate) close_stdin: Option<StdinCloser>,
    pub(crate) buffer_size: usize,
}

impl AttachOptions {
    /// Attach `stdout` and nothing else.
    pub fn new<W>(stdout: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            stdin: None,
            stdout: Box::new(stdout),
            stderr: None,
            tty: false,
            stdin_once: false,
            close_stdin: None,
            buffer_size: const_copy::DEFAULT_BUFFER_SIZE,
        }
    }

    /// Forward `stdin` into the container.
    pub fn stdin<R>(mut self, stdin: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.stdin = Some(Box::new(stdin));
        self
    }

    /// Receive the container's stderr. Ignored when a tty is in use.
    pub fn stderr<W>(mut self, stderr: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.stderr = Some(Box::new(stderr));
        self
    }

    /// Pseudo-terminal mode: stdout carries combined output.
    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Close the container's stdin after the first end-of-input.
    pub fn stdin_once(mut self, stdin_once: bool) -> Self {
        self.stdin_once = stdin_once;
        self
    }

    /// Callback closing the container side of stdin (used with `stdin_once`).
    pub fn close_stdin(mut self, closer: StdinCloser) -> Self {
        self.close_stdin = Some(closer);
        self
    }

    /// Copy buffer size per direction. Zero falls back to the default.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = if size == 0 {
            const_copy::DEFAULT_BUFFER_SIZE
        } else {
            size
        };
        self
    }
}

impl fmt::Debug for AttachOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachOptions")
            .field("stdin", &self.stdin.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("tty", &self.tty)
            .field("stdin_once", &self.stdin_once)
            .field("close_stdin", &self.close_stdin)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
