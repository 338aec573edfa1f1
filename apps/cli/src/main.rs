mod commands;
mod config;
mod util;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let app = commands::App::parse();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run(app))
}
