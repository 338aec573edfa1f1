//! `skylift remotes`: list configured remotes.

use clap::Args;

use crate::config::Config;

#[derive(Debug, Args)]
pub struct RemotesArgs {}

pub fn run(config: &Config, _args: RemotesArgs) -> anyhow::Result<()> {
    if config.remotes.is_empty() {
        println!(
            "No remotes configured; add one to {}",
            config.path().display()
        );
        return Ok(());
    }
    for (name, remote) in &config.remotes {
        if remote.root_folder.is_empty() {
            println!("{name}");
        } else {
            println!("{name} (root folder: {})", remote.root_folder);
        }
    }
    Ok(())
}
