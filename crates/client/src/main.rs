//! trellis-client: submit an image to the job service and wait for the
//! generated 3D assets.

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use trellis_client::TrellisApi;

#[derive(Parser)]
#[command(name = "trellis-client")]
#[command(about = "Generate 3D assets from an image via the TRELLIS service", long_about = None)]
struct Args {
    /// Image to upload (PNG, JPEG or WebP)
    image_path: PathBuf,

    /// Service base URL
    #[arg(long, default_value = "http://localhost:5000")]
    server: String,

    /// Call /initialize before submitting
    #[arg(long)]
    initialize: bool,

    /// Seconds between status polls
    #[arg(long, default_value = "5")]
    poll_interval_secs: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "1800")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trellis_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let api = TrellisApi::new(&args.server);

    if args.initialize {
        tracing::info!(server = %api.base_url(), "Initializing service");
        let response = api.initialize().await.context("initialization failed")?;
        println!(
            "Initialization: {}",
            response["message"].as_str().unwrap_or("ok")
        );
    }

    let accepted = api
        .submit(&args.image_path)
        .await
        .context("submission failed")?;
    println!("Request ID: {}", accepted.request_id);

    let poll_interval = Duration::from_secs(args.poll_interval_secs.max(1));
    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);

    loop {
        let status = api.status(&accepted.request_id).await?;
        tracing::debug!(status = %status.status, elapsed = status.processing_time, "Polled status");

        match status.status.as_str() {
            "completed" => {
                println!("Completed in {:.1}s", status.processing_time);
                for (name, location) in status.result.unwrap_or_default() {
                    println!("  {name}: {location}");
                }
                return Ok(());
            }
            "failed" => {
                bail!(
                    "job {} failed: {}",
                    status.request_id,
                    status.error.as_deref().unwrap_or("unknown error")
                );
            }
            other => {
                println!("Status: {other} ({:.0}s)", status.processing_time);
            }
        }

        if Instant::now() >= deadline {
            bail!(
                "timed out after {}s waiting for job {}",
                args.timeout_secs,
                accepted.request_id
            );
        }
        tokio::time::sleep(poll_interval).await;
    }
}
