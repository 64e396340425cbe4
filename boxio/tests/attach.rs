//! Integration tests for attach sessions over real named pipes.

use boxio::attach::FnRelease;
use boxio::{
    AttachGroup, AttachOptions, AttachState, CopyOutcome, FifoSet, StdinCloser, StreamType,
    new_fifos,
};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::unix::pipe;

const DEADLINE: Duration = Duration::from_secs(10);

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// Provisioned FIFO set in an isolated root.
struct TestContext {
    fifos: FifoSet,
    _temp_dir: TempDir,
}

impl TestContext {
    fn new(tty: bool, stdin: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let fifos = new_fifos(temp_dir.path(), "ctr", tty, stdin).expect("Failed to provision");
        Self {
            fifos,
            _temp_dir: temp_dir,
        }
    }

    /// Container side of stdin. The stdin copy connects once this is open.
    fn container_stdin(&self) -> pipe::Receiver {
        open_receiver(self.fifos.stdin.as_ref().unwrap())
    }

    /// Container side of an output pipe. Open after `start`.
    fn container_output(&self, stream: StreamType) -> pipe::Sender {
        pipe::OpenOptions::new()
            .open_sender(self.fifos.path(stream).unwrap())
            .expect("Failed to open container output")
    }
}

fn open_receiver(path: &Path) -> pipe::Receiver {
    pipe::OpenOptions::new()
        .open_receiver(path)
        .expect("Failed to open container stdin")
}

fn counting_closer() -> (StdinCloser, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let closer = StdinCloser::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (closer, calls)
}

async fn read_all(mut reader: DuplexStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(DEADLINE, reader.read_to_end(&mut out))
        .await
        .expect("sink was never closed")
        .unwrap();
    out
}

async fn wait_for_outcome(group: &AttachGroup, stream: StreamType) -> CopyOutcome {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    loop {
        if let Some((_, outcome)) = group.outcomes().into_iter().find(|(s, _)| *s == stream) {
            return outcome;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{stream} copy never finished"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Sink that never accepts a byte.
struct StuckSink;

impl AsyncWrite for StuckSink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

/// Source whose first read fails.
struct FailingSource;

impl AsyncRead for FailingSource {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "client gone")))
    }
}

// ============================================================================
// WIRING TESTS
// ============================================================================

#[tokio::test]
async fn tty_with_stdin_launches_stdin_and_combined_stdout() {
    let ctx = TestContext::new(true, true);
    assert!(ctx.fifos.stdin.is_some());
    assert!(ctx.fifos.stdout.is_some());
    assert!(ctx.fifos.stderr.is_none());

    let (stdout_tx, _stdout_rx) = tokio::io::duplex(1024);
    let (stderr_tx, _stderr_rx) = tokio::io::duplex(1024);
    let (_client, stdin_source) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(
            AttachOptions::new(stdout_tx)
                .stdin(stdin_source)
                .stderr(stderr_tx)
                .tty(true),
            &ctx.fifos,
        )
        .unwrap();

    assert_eq!(group.streams(), vec![StreamType::Stdin, StreamType::Stdout]);

    group.cancel();
    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
}

#[tokio::test]
async fn no_stdin_no_tty_copies_both_outputs_until_peers_close() {
    let ctx = TestContext::new(false, false);
    assert!(ctx.fifos.stdin.is_none());

    let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);
    let (stderr_tx, stderr_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(AttachOptions::new(stdout_tx).stderr(stderr_tx), &ctx.fifos)
        .unwrap();
    assert_eq!(group.streams(), vec![StreamType::Stdout, StreamType::Stderr]);

    let mut out = ctx.container_output(StreamType::Stdout);
    let mut err = ctx.container_output(StreamType::Stderr);
    out.write_all(b"to stdout").await.unwrap();
    err.write_all(b"to stderr").await.unwrap();
    drop(out);
    drop(err);

    assert!(group.wait_timeout(DEADLINE).await);
    assert_eq!(group.state(), AttachState::Draining);
    assert_eq!(read_all(stdout_rx).await, b"to stdout");
    assert_eq!(read_all(stderr_rx).await, b"to stderr");
    assert!(
        group
            .outcomes()
            .iter()
            .all(|(_, outcome)| *outcome == CopyOutcome::Eof)
    );

    group.close();
    assert_eq!(group.state(), AttachState::Closed);
}

#[tokio::test]
async fn stderr_sink_is_ignored_for_tty_option() {
    let ctx = TestContext::new(false, false);
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(1024);
    let (stderr_tx, _stderr_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(
            AttachOptions::new(stdout_tx).stderr(stderr_tx).tty(true),
            &ctx.fifos,
        )
        .unwrap();
    assert_eq!(group.streams(), vec![StreamType::Stdout]);

    group.cancel();
    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
}

// ============================================================================
// STDIN POLICY TESTS
// ============================================================================

#[tokio::test]
async fn stdin_once_closes_container_stdin_exactly_once() {
    let ctx = TestContext::new(false, true);
    let mut container_stdin = ctx.container_stdin();
    let (closer, calls) = counting_closer();
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(
            AttachOptions::new(stdout_tx)
                .stdin(&b"hello"[..])
                .stdin_once(true)
                .close_stdin(closer.clone()),
            &ctx.fifos,
        )
        .unwrap();

    let mut received = Vec::new();
    tokio::time::timeout(DEADLINE, container_stdin.read_to_end(&mut received))
        .await
        .expect("container stdin never reached EOF")
        .unwrap();
    assert_eq!(received, b"hello");

    assert_eq!(wait_for_outcome(&group, StreamType::Stdin).await, CopyOutcome::Eof);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    group.cancel();
    group.close();
    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
    assert!(!closer.close().unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stdin_eof_without_stdin_once_keeps_container_stdin_open() {
    let ctx = TestContext::new(false, true);
    let mut container_stdin = ctx.container_stdin();
    let (closer, calls) = counting_closer();
    let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);
    let (stderr_tx, stderr_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(
            AttachOptions::new(stdout_tx)
                .stderr(stderr_tx)
                .stdin(&b"data"[..])
                .close_stdin(closer),
            &ctx.fifos,
        )
        .unwrap();

    let mut buf = [0u8; 4];
    tokio::time::timeout(DEADLINE, container_stdin.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"data");

    // The client is done, the container is not told so.
    assert_eq!(wait_for_outcome(&group, StreamType::Stdin).await, CopyOutcome::Eof);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let mut more = [0u8; 1];
    assert!(
        tokio::time::timeout(Duration::from_millis(200), container_stdin.read(&mut more))
            .await
            .is_err()
    );

    // Outputs carry on independently.
    assert_eq!(group.state(), AttachState::Running);
    let mut out = ctx.container_output(StreamType::Stdout);
    out.write_all(b"still here").await.unwrap();
    drop(out);
    drop(ctx.container_output(StreamType::Stderr));

    assert!(group.wait_timeout(DEADLINE).await);
    assert_eq!(read_all(stdout_rx).await, b"still here");
    assert!(read_all(stderr_rx).await.is_empty());

    // Close releases the parked stdin pipe: now the container sees EOF.
    group.close();
    let n = tokio::time::timeout(DEADLINE, container_stdin.read(&mut more))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stdin_failure_does_not_stop_siblings() {
    let ctx = TestContext::new(false, true);
    let _container_stdin = ctx.container_stdin();
    let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(
            AttachOptions::new(stdout_tx).stdin(FailingSource),
            &ctx.fifos,
        )
        .unwrap();

    assert!(matches!(
        wait_for_outcome(&group, StreamType::Stdin).await,
        CopyOutcome::Failed(_)
    ));
    assert_eq!(group.state(), AttachState::Running);

    let mut out = ctx.container_output(StreamType::Stdout);
    out.write_all(b"ok").await.unwrap();
    drop(out);
    drop(ctx.container_output(StreamType::Stderr));

    assert!(group.wait_timeout(DEADLINE).await);
    assert_eq!(read_all(stdout_rx).await, b"ok");
    group.close();
}

#[tokio::test]
async fn stdin_write_fails_once_container_reader_is_gone() {
    let ctx = TestContext::new(false, true);
    let container_stdin = ctx.container_stdin();
    let (mut client, stdin_source) = tokio::io::duplex(1024);
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(AttachOptions::new(stdout_tx).stdin(stdin_source), &ctx.fifos)
        .unwrap();

    // The container closes its stdin and goes away.
    drop(container_stdin);
    client.write_all(b"nobody reads this").await.unwrap();

    match wait_for_outcome(&group, StreamType::Stdin).await {
        CopyOutcome::Failed(reason) => assert!(reason.starts_with("write"), "{reason}"),
        other => panic!("unexpected stdin outcome: {other:?}"),
    }
    assert_eq!(group.state(), AttachState::Running);

    group.cancel();
    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
}

#[tokio::test]
async fn stdin_waits_for_container_reader_that_opens_late() {
    let ctx = TestContext::new(false, true);
    let (mut client, stdin_source) = tokio::io::duplex(1024);
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(1024);

    let group = AttachGroup::new("ctr");
    group
        .start(AttachOptions::new(stdout_tx).stdin(stdin_source), &ctx.fifos)
        .unwrap();
    assert_eq!(group.streams(), vec![StreamType::Stdin, StreamType::Stdout]);

    client.write_all(b"early").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut container_stdin = ctx.container_stdin();

    let mut buf = [0u8; 5];
    tokio::time::timeout(DEADLINE, container_stdin.read_exact(&mut buf))
        .await
        .expect("stdin never connected")
        .unwrap();
    assert_eq!(&buf, b"early");

    group.cancel();
    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
}

#[tokio::test]
async fn cancel_while_waiting_for_container_reader() {
    let ctx = TestContext::new(false, true);
    let (_client, stdin_source) = tokio::io::duplex(64);
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(64);

    let group = AttachGroup::new("ctr");
    group
        .start(AttachOptions::new(stdout_tx).stdin(stdin_source), &ctx.fifos)
        .unwrap();

    group.cancel();
    assert_eq!(wait_for_outcome(&group, StreamType::Stdin).await, CopyOutcome::Cancelled);
    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
}

// ============================================================================
// CANCEL / CLOSE TESTS
// ============================================================================

#[tokio::test]
async fn close_unblocks_wait_when_peer_never_closes() {
    let ctx = TestContext::new(true, false);

    let group = AttachGroup::new("ctr");
    group
        .start(AttachOptions::new(StuckSink), &ctx.fifos)
        .unwrap();

    // Container keeps its end open and the client never drains.
    let mut out = ctx.container_output(StreamType::Stdout);
    out.write_all(b"pending output").await.unwrap();

    group.cancel();
    assert!(!group.wait_timeout(Duration::from_millis(200)).await);
    assert_eq!(group.state(), AttachState::Running);

    group.close();
    assert!(group.wait_timeout(DEADLINE).await);
    assert_eq!(
        group.outcomes(),
        vec![(StreamType::Stdout, CopyOutcome::Severed)]
    );
    drop(out);
}

#[tokio::test]
async fn cancel_stops_idle_tasks_without_close() {
    let ctx = TestContext::new(false, true);
    let _container_stdin = ctx.container_stdin();
    let (_client, stdin_source) = tokio::io::duplex(64);
    let (stdout_tx, stdout_rx) = tokio::io::duplex(64);
    let (stderr_tx, stderr_rx) = tokio::io::duplex(64);
    let (closer, calls) = counting_closer();

    let group = AttachGroup::new("ctr");
    group
        .start(
            AttachOptions::new(stdout_tx)
                .stderr(stderr_tx)
                .stdin(stdin_source)
                .stdin_once(true)
                .close_stdin(closer),
            &ctx.fifos,
        )
        .unwrap();

    group.cancel();
    group.cancel();
    assert!(group.wait_timeout(DEADLINE).await);
    assert!(
        group
            .outcomes()
            .iter()
            .all(|(_, outcome)| *outcome == CopyOutcome::Cancelled)
    );
    // Cancellation is not end-of-input.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // Output sinks are closed by their tasks.
    assert!(read_all(stdout_rx).await.is_empty());
    assert!(read_all(stderr_rx).await.is_empty());

    group.close();
}

#[tokio::test]
async fn repeated_and_concurrent_close_release_once() {
    let ctx = TestContext::new(false, false);
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(64);
    let group = AttachGroup::new("ctr");

    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    for (i, counter) in counters.iter().enumerate() {
        let counter = counter.clone();
        group.register(Box::new(FnRelease::new(format!("connector-{i}"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));
    }
    group
        .start(AttachOptions::new(stdout_tx), &ctx.fifos)
        .unwrap();

    let closers: Vec<_> = (0..8)
        .map(|_| {
            let group = group.clone();
            tokio::spawn(async move {
                group.cancel();
                group.close();
            })
        })
        .collect();
    for handle in closers {
        handle.await.unwrap();
    }
    group.close();

    assert!(group.wait_timeout(DEADLINE).await);
    assert_eq!(group.state(), AttachState::Closed);
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn release_failures_are_not_fatal() {
    let group = AttachGroup::new("ctr");
    let after = Arc::new(AtomicUsize::new(0));
    let counter = after.clone();

    group.register(Box::new(FnRelease::new("broken", || {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "already closed"))
    })));
    group.register(Box::new(FnRelease::new("log file", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })));

    group.close();
    assert_eq!(after.load(Ordering::SeqCst), 1);
    assert_eq!(group.state(), AttachState::Closed);
}

#[tokio::test]
async fn register_after_close_releases_immediately() {
    let group = AttachGroup::new("ctr");
    group.close();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    group.register(Box::new(FnRelease::new("late", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    group.close();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
