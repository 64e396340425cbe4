use boxio::{AttachGroup, AttachOptions, CopyOutcome, FifoSet};
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Container ID
    pub id: String,

    /// Do not forward this terminal's stdin even if the container has a stdin pipe
    #[arg(long)]
    pub no_stdin: bool,

    /// Close the container's stdin after the first EOF on ours, by closing
    /// our end of its stdin pipe
    #[arg(long)]
    pub stdin_once: bool,

    /// Detach after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

pub async fn execute(args: AttachArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.options();
    options.validate()?;

    let fifos = FifoSet::load(options.io_root(), &args.id)?;

    let mut attach = AttachOptions::new(tokio::io::stdout())
        .tty(fifos.terminal)
        .stdin_once(args.stdin_once)
        .buffer_size(options.copy_buffer_size);
    if !fifos.terminal {
        attach = attach.stderr(tokio::io::stderr());
    }
    if fifos.stdin.is_some() && !args.no_stdin {
        attach = attach.stdin(tokio::io::stdin());
    }

    let group = AttachGroup::new(args.id.as_str());
    group.start(attach, &fifos)?;

    let timeout = async {
        match args.timeout {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = group.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(id = %args.id, "Interrupted, detaching");
        }
        _ = timeout => {
            tracing::info!(id = %args.id, "Timeout reached, detaching");
        }
    }

    group.cancel();
    group.close();
    group.wait().await;

    for (stream, outcome) in group.outcomes() {
        if let CopyOutcome::Failed(reason) = outcome {
            tracing::warn!(id = %args.id, stream = %stream, "Copy failed: {}", reason);
        }
    }
    Ok(())
}
