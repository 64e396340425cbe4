use boxio::new_fifos;
use clap::Args;

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Container ID
    pub id: String,

    /// Allocate a pseudo-terminal (stdout and stderr share one pipe)
    #[arg(short, long)]
    pub tty: bool,

    /// Create a stdin pipe
    #[arg(short = 'i', long)]
    pub stdin: bool,
}

pub async fn execute(args: ProvisionArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.options();
    options.validate()?;

    let fifos = new_fifos(options.io_root(), &args.id, args.tty, args.stdin)?;
    println!("{}", serde_json::to_string_pretty(&fifos.config())?);
    Ok(())
}
