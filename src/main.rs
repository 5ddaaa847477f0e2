//! Run one augmentation job described by a JSON request file.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use llm_batch_augment::{CsvLoader, JobRequest, ObjectStoreSink, OpenAiClient, Pipeline};

#[derive(Parser)]
#[command(name = "llm-batch-augment")]
#[command(about = "Augment a CSV dataset with one LLM response per row", long_about = None)]
struct Cli {
    /// JSON job request: source_locator, column_index, max_rows,
    /// system_prompt, model, temperature. Use `-` for stdin.
    request: PathBuf,
}

fn read_request(path: &Path) -> Result<JobRequest> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Invalid job request")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let request = read_request(&cli.request)?;

    let client = OpenAiClient::from_env()?;
    let sink = ObjectStoreSink::from_env()?;
    let pipeline = Pipeline::builder(client).build()?;

    let report = pipeline.run(&CsvLoader::new(), &sink, &request).await?;

    println!("{}", report.location.unwrap_or_default());
    Ok(())
}
