//! Logging setup.

use crate::options::BoxioOptions;
use boxio_shared::errors::{BoxioError, BoxioResult};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Log file name prefix inside `log_dir`.
const LOG_FILE: &str = "boxio.log";

/// Install the global tracing subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info`. With `options.log_dir` set, logs
/// go to a daily rolling file and the returned guard must be kept alive to
/// flush them. Calling this more than once is harmless: the first subscriber
/// stays installed.
pub fn init_logging(options: &BoxioOptions) -> BoxioResult<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| BoxioError::provision(dir, e))?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            register_to_tracing(non_blocking, env_filter);
            Ok(Some(guard))
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .try_init();
            Ok(None)
        }
    }
}

fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}
