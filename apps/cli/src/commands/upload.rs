//! `skylift upload`: chunked upload of one file, with verification.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use skylift_graph::DriveClient;
use skylift_transfer::{
    ProgressFn, TransferRate, UploadOptions, Uploader, Verification, VerifyOptions,
    clamp_chunk_size, verify_file,
};

use crate::config::Config;
use crate::util::{download_url, format_bytes, join_remote_path};

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// File to upload.
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Folder under the remote's root folder; empty for the root itself.
    #[arg(long, short = 'r', default_value = "")]
    pub remote_folder: String,

    /// Remote file name; defaults to the local file name.
    #[arg(long, short = 'n')]
    pub remote_name: Option<String>,

    /// Chunk size in bytes; 0 picks one from the file size.
    #[arg(long, short = 's', default_value_t = 0)]
    pub chunk_size: u64,

    /// Attempts per chunk.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Milliseconds between attempts on the same chunk.
    #[arg(long, default_value_t = 5000)]
    pub retry_delay: u64,

    /// Skip the post-upload hash comparison.
    #[arg(long)]
    pub skip_verify: bool,

    /// Attempts to fetch the remote hash.
    #[arg(long, default_value_t = 5)]
    pub verify_retries: u32,

    /// Milliseconds between remote hash fetches.
    #[arg(long, default_value_t = 10000)]
    pub verify_retry_delay: u64,
}

pub async fn run(mut config: Config, remote: Option<&str>, args: UploadArgs) -> anyhow::Result<()> {
    let (name, remote) = config.resolve_remote(remote)?;
    let name = name.to_string();
    let remote = remote.clone();

    let local_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("{} has no usable file name", args.file.display()))?;
    let file_name = args.remote_name.as_deref().unwrap_or(local_name);
    let remote_path = join_remote_path(&[&remote.root_folder, &args.remote_folder, file_name]);
    let file_size = std::fs::metadata(&args.file)?.len();

    let chunk_size = if args.chunk_size == 0 {
        0
    } else {
        clamp_chunk_size(args.chunk_size)
    };

    let client = DriveClient::new(remote.credential()?)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            ctrl_c.cancel();
        }
    });

    println!(
        "Uploading {} ({}) to {name}:/{remote_path}",
        args.file.display(),
        format_bytes(file_size),
    );

    let opts = UploadOptions {
        chunk_size,
        max_retries: args.retries.max(1),
        retry_delay: Duration::from_millis(args.retry_delay),
    };

    let started = Instant::now();
    let uploader = Uploader::new(&client, cancel.clone());
    let item_id = uploader
        .upload(
            &args.file,
            &remote_path,
            &opts,
            Some(progress_reporter(file_size)),
        )
        .await?;

    let elapsed = started.elapsed();
    println!(
        "Uploaded in {:.1}s ({}/s), item id {item_id}",
        elapsed.as_secs_f64(),
        format_bytes(average_rate(file_size, elapsed)),
    );

    // The refresh may have rotated the token set; keep the file current.
    if let Err(e) = config.persist_tokens(&name, &client.token_guard().credential()) {
        warn!(error = %e, "could not write refreshed tokens back");
    }

    if args.skip_verify {
        info!("verification skipped");
    } else {
        let verify_opts = VerifyOptions {
            retries: args.verify_retries,
            retry_delay: Duration::from_millis(args.verify_retry_delay),
        };
        match verify_file(&client, &args.file, &item_id, &verify_opts, &cancel).await? {
            Verification::Verified => println!("Integrity verified (QuickXorHash match)"),
            Verification::Mismatch { local, remote } => {
                anyhow::bail!("hash mismatch after upload: local {local}, remote {remote}")
            }
            Verification::Unverifiable { reason } => {
                warn!(reason = %reason, "could not verify the upload");
            }
        }
    }

    // The public site serves from inside the root folder, so the link
    // omits it.
    if let Some(base) = remote.public_base_url.as_deref() {
        let public_path = join_remote_path(&[&args.remote_folder, file_name]);
        println!("Download URL: {}", download_url(base, &public_path));
    }

    Ok(())
}

/// Builds a progress callback that prints at most one line a second.
///
/// Bytes can move backwards when a replacement session rewinds the
/// cursor; the rate window resets instead of going negative.
fn progress_reporter(total: u64) -> ProgressFn {
    let rate = TransferRate::new(None, None);
    let mut last_print: Option<Instant> = None;

    Box::new(move |transferred| {
        rate.record(transferred);

        let due = last_print.is_none_or(|t| t.elapsed() >= Duration::from_secs(1));
        if due || transferred >= total {
            last_print = Some(Instant::now());
            let pct = if total == 0 {
                100.0
            } else {
                transferred as f64 * 100.0 / total as f64
            };
            let eta = rate
                .eta(total.saturating_sub(transferred))
                .map(|d| format!(", ETA {}s", d.as_secs()))
                .unwrap_or_default();
            println!(
                "  {pct:>5.1}%  {} / {}  {}/s{eta}",
                format_bytes(transferred),
                format_bytes(total),
                format_bytes(rate.bytes_per_second() as u64),
            );
        }
        Ok(())
    })
}

fn average_rate(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return bytes;
    }
    (bytes as f64 / secs) as u64
}
