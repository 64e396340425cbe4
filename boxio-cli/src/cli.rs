use crate::commands::{attach::AttachArgs, provision::ProvisionArgs, rm::RmArgs};
use boxio::BoxioOptions;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Attach terminals and log collectors to container stdio pipes
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the named pipes for a container and print their paths
    Provision(ProvisionArgs),

    /// Attach this terminal to a provisioned container
    Attach(AttachArgs),

    /// Remove a container's named pipes
    Rm(RmArgs),
}

#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// boxio home directory (pipes live under <home>/io/<id>)
    #[arg(long, global = true, env = "BOXIO_HOME")]
    pub home: Option<PathBuf>,

    /// Write logs to daily rolling files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

impl GlobalFlags {
    pub fn options(&self) -> BoxioOptions {
        let mut options = match &self.home {
            Some(home) => BoxioOptions::with_home(home),
            None => BoxioOptions::default(),
        };
        options.log_dir = self.log_dir.clone();
        options
    }
}
