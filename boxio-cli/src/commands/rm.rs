use boxio::FifoSet;
use clap::Args;

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container ID
    pub id: String,
}

pub async fn execute(args: RmArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.options();
    options.validate()?;

    match FifoSet::load(options.io_root(), &args.id) {
        Ok(fifos) => fifos.remove()?,
        Err(e) if e.io_kind() == Some(std::io::ErrorKind::NotFound) => {
            tracing::debug!(id = %args.id, "No fifo set to remove");
        }
        Err(e) => return Err(e.into()),
    }

    println!("{}", args.id);
    Ok(())
}
