//! Submits an image as a job on the default queue.
//!
//! Run with:
//!     cargo run --example submit -- path/to/cat.jpg
//!
//! Configuration comes from `.remotejob.toml`, the user config file and the
//! `S3_*` / `REMOTEJOB_*` environment variables.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use remotejob::{load_config, validate_config, RemoteJobClient, StoreRequest};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("cat.jpg"), PathBuf::from);
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("path has no file name")?
        .to_string();
    let body = tokio::fs::read(&path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;

    let config = load_config(None, None)?;
    let problems = validate_config(&config);
    if !problems.is_empty() {
        bail!("invalid configuration:\n  {}", problems.join("\n  "));
    }

    let client = RemoteJobClient::connect(config).await;
    let request = StoreRequest::new(body)
        .with_field("name", "Cat Montage")
        .with_field("filename", filename);

    match client.submit(request).await {
        Ok(job_id) => println!("job {job_id} submitted for processing"),
        Err(e) => {
            eprintln!("could not submit job\n{}", e.display_rich());
            std::process::exit(1);
        }
    }

    Ok(())
}
