//! Augment a small in-memory table without touching any storage.
//!
//! Run with: OPENAI_API_KEY=sk-... cargo run --example basic_run
//! Set OPENAI_BASE_URL to point at any OpenAI-compatible server.

use llm_batch_augment::{Dataset, OpenAiClient, Pipeline, PipelineConfig, PromptSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut client = OpenAiClient::from_env()?;
    if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        client = client.with_base_url(base_url);
    }

    let config = PipelineConfig::builder()
        .with_batch_size(2)
        .with_row_concurrency(4)
        .build();
    let pipeline = Pipeline::builder(client).with_config(config).build()?;

    let dataset = Dataset::new(
        vec!["id".into(), "review".into()],
        vec![
            vec!["1".into(), "Arrived late but works perfectly.".into()],
            vec!["2".into(), "Battery died after two days.".into()],
            vec!["3".into(), "Exactly as described, would buy again.".into()],
        ],
    );

    let settings = PromptSettings {
        column_index: 1,
        system_prompt: "Classify the sentiment of the review in one word.".into(),
        model: "gpt-4o-mini".into(),
        temperature: 0.0,
    };

    let table = pipeline.process(dataset, settings).await?;

    println!("{}", String::from_utf8(table.to_csv()?)?);
    Ok(())
}
