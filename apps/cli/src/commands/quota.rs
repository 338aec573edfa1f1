//! `skylift quota`: drive storage usage per remote.

use clap::Args;
use futures_util::future::join_all;

use skylift_graph::DriveClient;

use crate::config::{Config, RemoteConfig};
use crate::util::format_bytes;

#[derive(Debug, Args)]
pub struct QuotaArgs {}

pub async fn run(config: &Config, remote: Option<&str>, _args: QuotaArgs) -> anyhow::Result<()> {
    let targets: Vec<(&str, &RemoteConfig)> = match remote {
        Some(name) => vec![config.resolve_remote(Some(name))?],
        None => {
            anyhow::ensure!(
                !config.remotes.is_empty(),
                "no remotes configured; add one to {}",
                config.path().display()
            );
            config
                .remotes
                .iter()
                .map(|(name, remote)| (name.as_str(), remote))
                .collect()
        }
    };

    let lookups = targets.into_iter().map(|(name, remote)| async move {
        let quota = async {
            let client = DriveClient::new(remote.credential()?)?;
            Ok::<_, anyhow::Error>(client.quota().await?)
        }
        .await;
        (name, quota)
    });

    // One block per remote, errors included, so a dead account does not
    // hide the others.
    let mut failures = 0usize;
    for (name, quota) in join_all(lookups).await {
        match quota {
            Ok(q) => {
                println!("Remote: {name}");
                println!("Total:   {}", format_bytes(q.total));
                println!("Used:    {}", format_bytes(q.used));
                println!("Free:    {}", format_bytes(q.remaining));
                println!("Trashed: {}", format_bytes(q.deleted));
                println!();
            }
            Err(e) => {
                failures += 1;
                println!("Remote: {name}");
                println!("Error:   {e}");
                println!();
            }
        }
    }
    anyhow::ensure!(
        failures == 0,
        "failed to fetch quota for {failures} remote(s)"
    );
    Ok(())
}
