//! Release-once bookkeeping.
//!
//! [`CloserSet`] holds everything an attach session must release. Closing it
//! is guarded by an atomic flag, so concurrent and repeated closes release
//! each entry exactly once, and an entry pushed after the set closed is
//! released on the spot.
//!
//! Pipe handles are not closed from here directly: their copy task owns them.
//! Each pipe gets a [`PipeLink`] whose sever token makes the owning task drop
//! the handle at its current await point. Handles that outlived their task
//! are parked in the link and dropped when it is severed.

use crate::fifo::HostPipe;
use crate::stream::StreamType;
use boxio_shared::errors::BoxioError;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A resource released when an attach session closes.
pub trait Release: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Release the resource. Called at most once.
    fn release(self: Box<Self>) -> io::Result<()>;
}

/// [`Release`] backed by a closure.
pub struct FnRelease<F> {
    name: String,
    f: F,
}

impl<F> FnRelease<F>
where
    F: FnOnce() -> io::Result<()> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Release for FnRelease<F>
where
    F: FnOnce() -> io::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        (self.f)()
    }
}

/// Resources owned by one attach session.
pub(crate) struct CloserSet {
    closed: AtomicBool,
    items: Mutex<Vec<Box<dyn Release>>>,
}

impl CloserSet {
    pub(crate) fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            items: Mutex::new(Vec::new()),
        }
    }

    /// Track `item`, or release it now if the set is already closed.
    pub(crate) fn push(&self, item: Box<dyn Release>) -> Option<BoxioError> {
        let mut items = self.items.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(items);
            return release_one(item);
        }
        items.push(item);
        None
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release every tracked item.
    ///
    /// Returns `None` if an earlier call already closed the set, otherwise the
    /// release failures (which never stop the remaining releases).
    pub(crate) fn close(&self) -> Option<Vec<BoxioError>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let items = std::mem::take(&mut *self.items.lock());
        Some(items.into_iter().filter_map(release_one).collect())
    }
}

fn release_one(item: Box<dyn Release>) -> Option<BoxioError> {
    let resource = item.name().to_string();
    match item.release() {
        Ok(()) => {
            debug!(resource = %resource, "Released");
            None
        }
        Err(source) => Some(BoxioError::Release { resource, source }),
    }
}

/// Shared link between a copy task and the close path of its pipe.
#[derive(Debug)]
pub(crate) struct PipeLink {
    stream: StreamType,
    sever: CancellationToken,
    parked: Mutex<Option<HostPipe>>,
}

impl PipeLink {
    pub(crate) fn new(stream: StreamType) -> Arc<Self> {
        Arc::new(Self {
            stream,
            sever: CancellationToken::new(),
            parked: Mutex::new(None),
        })
    }

    /// Resolves once the pipe has been released.
    pub(crate) async fn severed(&self) {
        self.sever.cancelled().await
    }

    /// Keep `pipe` open until release. Dropped at once if already released.
    pub(crate) fn park(&self, pipe: HostPipe) {
        let mut parked = self.parked.lock();
        if self.sever.is_cancelled() {
            drop(parked);
            drop(pipe);
            return;
        }
        *parked = Some(pipe);
    }

    #[cfg(test)]
    pub(crate) fn is_parked(&self) -> bool {
        self.parked.lock().is_some()
    }

    fn sever(&self) {
        let parked = {
            let mut parked = self.parked.lock();
            self.sever.cancel();
            parked.take()
        };
        if parked.is_some() {
            debug!(stream = %self.stream, "Closing parked pipe");
        }
    }
}

/// [`Release`] entry that severs a pipe.
pub(crate) struct PipeCloser {
    name: String,
    link: Arc<PipeLink>,
}

impl PipeCloser {
    pub(crate) fn new(link: Arc<PipeLink>) -> Self {
        Self {
            name: format!("{} pipe", link.stream),
            link,
        }
    }
}

impl Release for PipeCloser {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        self.link.sever();
        Ok(())
    }
}
