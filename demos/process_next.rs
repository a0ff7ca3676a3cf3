//! Takes the next job from the `pending` queue and saves its payload.
//!
//! Run with:
//!     cargo run --example process_next -- newcat.jpg
//!
//! Press Ctrl-C to stop waiting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::env;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use remotejob::{load_config, Asset, CancellationToken, JobOutcome, RemoteJobClient};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let output = env::args().nth(1).unwrap_or_else(|| "newcat.jpg".to_string());
    let config = load_config(None, None)?;
    let client = RemoteJobClient::connect(config).await;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        }
    });

    let job = match client.next("pending", &cancel).await {
        Ok(job) => job,
        Err(e) => {
            eprintln!("could not get next job\n{}", e.display_rich());
            std::process::exit(1);
        }
    };
    println!(
        "job {} ({}) received",
        job.id(),
        job.name().unwrap_or("unnamed")
    );

    let mut file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("could not create {output}"))?;
    let mut stream = job.create_read_stream().await?;
    let mut written = 0;
    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;
    println!("wrote {written} bytes to {output}");

    let receipt = format!("saved {written} bytes to {output}");
    let keys = job
        .complete(
            JobOutcome::Succeeded,
            vec![Asset::new(receipt).with_key("receipt")],
        )
        .await?;
    job.acknowledge().await?;
    println!("stored {}", keys.join(", "));

    Ok(())
}
