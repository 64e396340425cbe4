//! Stream copy tasks.
//!
//! One task per direction: client stdin into the container's stdin pipe, or
//! a container output pipe into a client sink. A task ends on end-of-stream,
//! on the first I/O error (never retried: a broken pipe means the peer is
//! gone), on cancellation, or when its pipe is severed by the group's close.

use super::closer::PipeLink;
use super::{BoxedReader, BoxedWriter, StdinCloser};
use crate::fifo::{HostPipe, StdinPipe};
use crate::stream::StreamType;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a copy task stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Source reached end-of-stream.
    Eof,
    /// The session was cancelled.
    Cancelled,
    /// The pipe was released while the task was still running.
    Severed,
    /// Read or write failed.
    Failed(String),
}

/// Per-session settings shared by every copy task.
#[derive(Clone)]
pub(crate) struct CopyContext {
    pub(crate) id: Arc<str>,
    pub(crate) cancel: CancellationToken,
    pub(crate) buffer_size: usize,
}

/// Move bytes from `reader` to `writer` until one of them stops.
///
/// Cancellation is observed while waiting for input; a chunk already read is
/// written out in full first.
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancellationToken,
    buffer_size: usize,
) -> CopyOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CopyOutcome::Cancelled,
            res = reader.read(&mut buf) => match res {
                Ok(0) => return CopyOutcome::Eof,
                Ok(n) => n,
                Err(e) => return CopyOutcome::Failed(format!("read: {}", e)),
            },
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            return CopyOutcome::Failed(format!("write: {}", e));
        }
        if let Err(e) = writer.flush().await {
            return CopyOutcome::Failed(format!("flush: {}", e));
        }
    }
}

/// Client input into the container's stdin pipe.
pub(crate) struct StdinCopy {
    pub(crate) source: BoxedReader,
    pub(crate) pipe: StdinPipe,
    pub(crate) link: Arc<PipeLink>,
    pub(crate) stdin_once: bool,
    pub(crate) close_stdin: Option<StdinCloser>,
}

impl StdinCopy {
    pub(crate) async fn run(self, ctx: CopyContext) -> CopyOutcome {
        let StdinCopy {
            mut source,
            pipe,
            link,
            stdin_once,
            close_stdin,
        } = self;

        // Client input is not read before the container can take it.
        let mut pipe = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return CopyOutcome::Cancelled,
            res = pipe.connect() => match res {
                Ok(sender) => sender,
                Err(e) => return CopyOutcome::Failed(format!("open: {}", e)),
            },
        };

        let outcome = pump(&mut source, &mut pipe, &ctx.cancel, ctx.buffer_size).await;
        match &outcome {
            CopyOutcome::Eof if stdin_once => {
                // Closing our end delivers EOF to the container.
                drop(pipe);
                if let Some(closer) = close_stdin {
                    match closer.close() {
                        Ok(true) => debug!(id = %ctx.id, "Closed container stdin"),
                        Ok(false) => {}
                        Err(e) => warn!(id = %ctx.id, error = %e, "Failed to close container stdin"),
                    }
                }
            }
            CopyOutcome::Eof | CopyOutcome::Cancelled => {
                // Container stdin stays open until the session closes.
                link.park(HostPipe::Stdin(pipe));
            }
            CopyOutcome::Severed | CopyOutcome::Failed(_) => drop(pipe),
        }
        outcome
    }
}

/// A container output pipe into a client sink.
pub(crate) struct OutputCopy {
    pub(crate) stream: StreamType,
    pub(crate) pipe: pipe::Receiver,
    pub(crate) sink: BoxedWriter,
    pub(crate) link: Arc<PipeLink>,
}

impl OutputCopy {
    pub(crate) async fn run(self, ctx: CopyContext) -> CopyOutcome {
        let OutputCopy {
            stream,
            mut pipe,
            mut sink,
            link,
        } = self;

        let outcome = pump(&mut pipe, &mut sink, &ctx.cancel, ctx.buffer_size).await;

        // The task owns the sink: closing it tells the client this stream is done.
        if let Err(e) = sink.shutdown().await {
            debug!(id = %ctx.id, stream = %stream, error = %e, "Sink shutdown failed");
        }
        drop(sink);

        if outcome == CopyOutcome::Cancelled {
            link.park(HostPipe::Output(pipe));
        }
        outcome
    }
}
