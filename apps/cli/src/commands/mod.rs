//! Command definitions and dispatch.

pub mod quota;
pub mod remotes;
pub mod upload;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name="skylift",version=env!("CARGO_PKG_VERSION"),about,long_about=None,propagate_version=true)]
pub struct App {
    /// Remote to operate on; defaults to the sole configured remote.
    #[arg(long, short = 'c', global = true)]
    pub remote: Option<String>,

    /// Config file location; defaults to the per-user path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "up", name = "upload", about = "Upload a file to a drive remote")]
    Upload(upload::UploadArgs),
    #[command(alias = "q", name = "quota", about = "Show drive storage usage")]
    Quota(quota::QuotaArgs),
    #[command(alias = "ls-remotes", name = "remotes", about = "List configured remotes")]
    Remotes(remotes::RemotesArgs),
}

pub async fn run(app: App) -> anyhow::Result<()> {
    let config = Config::load(app.config.as_deref())?;
    match app.cmd {
        Commands::Upload(args) => upload::run(config, app.remote.as_deref(), args).await,
        Commands::Quota(args) => quota::run(&config, app.remote.as_deref(), args).await,
        Commands::Remotes(args) => remotes::run(&config, args),
    }
}
