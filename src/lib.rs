//! # LLM Batch Augment
//!
//! Run every row of a large table through an LLM chat-completions API and
//! write the table back out with a `Response` column appended.
//!
//! The work is fanned out on two levels: the table is cut into fixed-size
//! batches that run concurrently, and the rows of each batch run
//! concurrently inside it. Both levels are bounded and carry deadlines.
//! Results are re-sorted by original row index at each level, so the output
//! order always matches the input order.
//!
//! ## Failure model
//!
//! - **Transient API failures** are retried with exponential backoff
//!   (1s, 2s, 4s, ... over 7 attempts). Exhaustion records
//!   `"Error: Unable to process"` for the row.
//! - **Bad rows** (e.g. a missing column) record the same sentinel.
//! - **Rows that miss their deadline** are dropped from the output by
//!   default; see [`DroppedRowPolicy`]. Compare [`RunReport::input_rows`]
//!   with [`RunReport::output_rows`] when the row count matters.
//! - **Upload failures** are logged; the run finishes with no location.
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_batch_augment::{CsvLoader, JobRequest, ObjectStoreSink, OpenAiClient, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::builder(OpenAiClient::from_env()?).build()?;
//!
//!     let request = JobRequest {
//!         source_locator: "https://example.com/records.csv".into(),
//!         column_index: 2,
//!         max_rows: 20_000,
//!         system_prompt: "Summarize the text in around 500-700 words.".into(),
//!         model: "gpt-4o-mini".into(),
//!         temperature: 0.1,
//!     };
//!
//!     let report = pipeline
//!         .run(&CsvLoader::new(), &ObjectStoreSink::from_env()?, &request)
//!         .await?;
//!
//!     println!("{:?}", report.location);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod prompt;
pub mod retry;
pub mod row;
pub mod storage;
pub mod table;
pub mod types;

pub use batch::BatchProcessor;
pub use client::{CompletionClient, CompletionRequest, OpenAiClient};
pub use config::{DroppedRowPolicy, PipelineConfig, PipelineConfigBuilder, RetryPolicy};
pub use error::{AugmentError, Result};
pub use pipeline::{Pipeline, PipelineBuilder, RunStage};
pub use progress::ProgressCounter;
pub use retry::RetryingCaller;
pub use row::{PromptSettings, RowProcessor};
pub use storage::{CsvLoader, DatasetLoader, ObjectStoreSink, ResultSink};
pub use table::FinalTable;
pub use types::{
    Batch, Dataset, JobRequest, ProcessingRequest, ProcessingResult, RunReport, ERROR_SENTINEL,
};
