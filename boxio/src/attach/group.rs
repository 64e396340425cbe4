//! Attach group: the lifecycle owner of one session's copy tasks.

use super::AttachOptions;
use super::closer::{CloserSet, PipeCloser, PipeLink, Release};
use super::copy::{CopyContext, CopyOutcome, OutputCopy, StdinCopy};
use crate::fifo::{FifoSet, HostPipe, StdinPipe, StdioPipes};
use crate::stream::StreamType;
use boxio_shared::errors::{BoxioError, BoxioResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Lifecycle state of an [`AttachGroup`].
///
/// Cancellation is an overlay reported by [`AttachGroup::is_cancelled`], not a
/// state of its own: it can be requested at any point before `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachState {
    /// Not started yet.
    Created,
    /// At least one copy task is still running.
    Running,
    /// Every copy task has exited; resources are not released yet.
    Draining,
    /// Resources released. Terminal.
    Closed,
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttachState::Created => "created",
            AttachState::Running => "running",
            AttachState::Draining => "draining",
            AttachState::Closed => "closed",
        };
        f.write_str(s)
    }
}

type Outcomes = Arc<Mutex<Vec<(StreamType, CopyOutcome)>>>;

struct GroupInner {
    id: Arc<str>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    closers: CloserSet,
    started: AtomicBool,
    launched: Mutex<Vec<StreamType>>,
    outcomes: Outcomes,
}

impl Drop for GroupInner {
    /// Last handle gone without `close()`: release anyway so no pipe leaks.
    fn drop(&mut self) {
        if let Some(errors) = self.closers.close() {
            self.tracker.close();
            for err in errors {
                warn!(id = %self.id, error = %err, "Release failed");
            }
            debug!(id = %self.id, "Attach group dropped without close");
        }
    }
}

/// Owns the copy tasks and pipe handles of one attach/exec session.
///
/// Cheap to clone; clones share the session so every exit path (normal
/// completion, cancellation handler, error handler) can call [`close`]
/// independently. Dropping the last clone closes the group.
///
/// # Example
///
/// ```no_run
/// # use boxio::{new_fifos, AttachGroup, AttachOptions};
/// # async fn example() -> boxio::BoxioResult<()> {
/// let fifos = new_fifos("/var/lib/boxio", "c1", false, true)?;
/// let group = AttachGroup::new("c1");
/// group.start(
///     AttachOptions::new(tokio::io::stdout())
///         .stdin(tokio::io::stdin())
///         .stderr(tokio::io::stderr()),
///     &fifos,
/// )?;
///
/// if !group.wait_timeout(std::time::Duration::from_secs(30)).await {
///     group.cancel();
/// }
/// group.close();
/// # Ok(())
/// # }
/// ```
///
/// [`close`]: AttachGroup::close
#[derive(Clone)]
pub struct AttachGroup {
    inner: Arc<GroupInner>,
}

impl AttachGroup {
    /// Create an idle group for session `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self {
            inner: Arc::new(GroupInner {
                id: Arc::from(id),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                closers: CloserSet::new(),
                started: AtomicBool::new(false),
                launched: Mutex::new(Vec::new()),
                outcomes: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Open the pipes of `fifos` and launch one copy task per enabled direction.
    ///
    /// A direction is enabled when both the pipe and the client endpoint are
    /// present; stderr is never wired in tty mode. Pipes without an endpoint
    /// stay open, unused, until [`close`](Self::close). Must be called from
    /// within a tokio runtime, at most once.
    ///
    /// # Errors
    ///
    /// - `Internal` if the group was already started or closed
    /// - `Pipe` if a pipe cannot be opened; no task is started and
    ///   [`wait`](Self::wait) returns immediately
    pub fn start(&self, options: AttachOptions, fifos: &FifoSet) -> BoxioResult<()> {
        let inner = &self.inner;
        if inner.closers.is_closed() {
            return Err(BoxioError::Internal(format!(
                "attach group {} is closed",
                inner.id
            )));
        }
        if inner.started.swap(true, Ordering::AcqRel) {
            return Err(BoxioError::Internal(format!(
                "attach group {} already started",
                inner.id
            )));
        }

        let pipes = match StdioPipes::open(fifos) {
            Ok(pipes) => pipes,
            Err(e) => {
                inner.tracker.close();
                return Err(e);
            }
        };

        let tty = options.tty || fifos.terminal;
        let ctx = CopyContext {
            id: inner.id.clone(),
            cancel: inner.cancel.clone(),
            buffer_size: options.buffer_size,
        };
        let AttachOptions {
            stdin,
            stdout,
            stderr,
            stdin_once,
            close_stdin,
            ..
        } = options;

        if let Some(pipe) = pipes.stdin {
            let link = self.track_pipe(StreamType::Stdin);
            match stdin {
                Some(source) => {
                    let copy = StdinCopy {
                        source,
                        pipe,
                        link: link.clone(),
                        stdin_once,
                        close_stdin,
                    };
                    self.spawn_copy(StreamType::Stdin, link, copy.run(ctx.clone()));
                }
                None => match pipe {
                    StdinPipe::Connected(sender) => link.park(HostPipe::Stdin(sender)),
                    StdinPipe::Pending(_) => {
                        debug!(id = %inner.id, "No stdin source, container stdin left unconnected")
                    }
                },
            }
        } else if stdin.is_some() {
            debug!(id = %inner.id, "Stdin disabled for this fifo set, input ignored");
        }

        if let Some(pipe) = pipes.stdout {
            let link = self.track_pipe(StreamType::Stdout);
            let copy = OutputCopy {
                stream: StreamType::Stdout,
                pipe,
                sink: stdout,
                link: link.clone(),
            };
            self.spawn_copy(StreamType::Stdout, link, copy.run(ctx.clone()));
        }

        if let Some(pipe) = pipes.stderr {
            let link = self.track_pipe(StreamType::Stderr);
            match stderr {
                Some(sink) if !tty => {
                    let copy = OutputCopy {
                        stream: StreamType::Stderr,
                        pipe,
                        sink,
                        link: link.clone(),
                    };
                    self.spawn_copy(StreamType::Stderr, link, copy.run(ctx));
                }
                _ => link.park(HostPipe::Output(pipe)),
            }
        }

        inner.tracker.close();

        let streams = self.streams();
        info!(
            id = %inner.id,
            streams = ?streams,
            tty,
            stdin_once,
            "Attach started"
        );
        Ok(())
    }

    /// Wait until every launched copy task has exited.
    ///
    /// Returns immediately once that has happened, however often it is called,
    /// and on a group that was never started since it has launched nothing.
    pub async fn wait(&self) {
        if !self.inner.started.load(Ordering::Acquire) {
            return;
        }
        self.inner.tracker.wait().await
    }

    /// [`wait`](Self::wait) bounded by `timeout`. Returns `false` on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Ask every copy task to stop at its next read.
    ///
    /// Idempotent and non-blocking; does not wait for the tasks.
    pub fn cancel(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!(id = %self.inner.id, "Attach cancelled");
        }
        self.inner.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Release every pipe handle and registered resource exactly once.
    ///
    /// Tasks still blocked on a released pipe abandon their I/O and exit,
    /// which unblocks [`wait`](Self::wait). Later calls are no-ops; release
    /// failures are logged and otherwise ignored.
    pub fn close(&self) {
        let Some(errors) = self.inner.closers.close() else {
            return;
        };
        self.inner.tracker.close();

        for err in &errors {
            warn!(id = %self.inner.id, error = %err, "Release failed");
        }
        info!(
            id = %self.inner.id,
            failures = errors.len(),
            "Attach closed"
        );
    }

    /// Hand an extra resource to the group, released by [`close`](Self::close).
    ///
    /// Released immediately if the group is already closed.
    pub fn register(&self, resource: Box<dyn Release>) {
        if let Some(err) = self.inner.closers.push(resource) {
            warn!(id = %self.inner.id, error = %err, "Release failed");
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AttachState {
        let inner = &self.inner;
        if inner.closers.is_closed() {
            AttachState::Closed
        } else if !inner.started.load(Ordering::Acquire) {
            AttachState::Created
        } else if inner.tracker.is_empty() {
            AttachState::Draining
        } else {
            AttachState::Running
        }
    }

    /// Directions a copy task was launched for, in launch order.
    pub fn streams(&self) -> Vec<StreamType> {
        self.inner.launched.lock().clone()
    }

    /// Why each finished copy task stopped, in completion order.
    pub fn outcomes(&self) -> Vec<(StreamType, CopyOutcome)> {
        self.inner.outcomes.lock().clone()
    }

    fn track_pipe(&self, stream: StreamType) -> Arc<PipeLink> {
        let link = PipeLink::new(stream);
        self.register(Box::new(PipeCloser::new(link.clone())));
        link
    }

    fn spawn_copy<F>(&self, stream: StreamType, link: Arc<PipeLink>, copy: F)
    where
        F: Future<Output = CopyOutcome> + Send + 'static,
    {
        let id = self.inner.id.clone();
        let outcomes = self.inner.outcomes.clone();

        self.inner.launched.lock().push(stream);
        self.inner.tracker.spawn(async move {
            debug!(id = %id, stream = %stream, "Stream copy started");
            let outcome = tokio::select! {
                biased;
                _ = link.severed() => CopyOutcome::Severed,
                outcome = copy => outcome,
            };
            info!(id = %id, stream = %stream, outcome = ?outcome, "Stream copy finished");
            outcomes.lock().push((stream, outcome));
        });
    }
}

impl fmt::Debug for AttachGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachGroup")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
