use crate::client::CompletionClient;
use crate::config::{DroppedRowPolicy, PipelineConfig};
use crate::pool::{self, PoolLimits, TaskOutcome};
use crate::row::{PromptSettings, RowProcessor};
use crate::types::{Batch, Dataset, ProcessingResult};
use std::sync::Arc;
use std::time::Instant;

/// Runs every row of one batch through a bounded row pool.
///
/// Rows that miss the per-row deadline, die, or are still unfinished when the
/// batch deadline passes are dropped from the output (or replaced by the error
/// sentinel under [`DroppedRowPolicy::Sentinel`]). The returned results are
/// sorted by original index.
pub struct BatchProcessor<C> {
    rows: RowProcessor<C>,
    limits: PoolLimits,
    dropped_rows: DroppedRowPolicy,
}

impl<C> Clone for BatchProcessor<C> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            limits: self.limits,
            dropped_rows: self.dropped_rows,
        }
    }
}

impl<C: CompletionClient> BatchProcessor<C> {
    pub fn new(rows: RowProcessor<C>, config: &PipelineConfig) -> Self {
        Self {
            rows,
            limits: PoolLimits::new(config.row_concurrency)
                .with_task_deadline(config.row_timeout)
                .with_overall_deadline(config.batch_timeout),
            dropped_rows: config.dropped_rows,
        }
    }

    pub async fn process(
        &self,
        dataset: Arc<Dataset>,
        batch: Batch,
        settings: Arc<PromptSettings>,
    ) -> Vec<ProcessingResult> {
        tracing::info!(
            "Processing batch {} with {} records started...",
            batch.number,
            batch.len()
        );
        let start = Instant::now();

        let tasks = batch.indices().map(|index| {
            let rows = self.rows.clone();
            let dataset = Arc::clone(&dataset);
            let settings = Arc::clone(&settings);
            let fut = async move {
                let row = dataset.row(index).unwrap_or(&[]);
                rows.process(index, row, &settings).await
            };
            (index, fut)
        });

        let report = pool::run_bounded(tasks, self.limits).await;

        let mut results = Vec::with_capacity(batch.len());
        for (index, outcome) in report.outcomes {
            match outcome {
                TaskOutcome::Completed(result) => results.push(result),
                TaskOutcome::TimedOut => {
                    tracing::warn!("Timeout for record at index {}. Skipping.", index);
                    self.on_dropped(index, &mut results);
                }
                TaskOutcome::Failed(e) => {
                    tracing::error!("Error processing record at index {}: {}", index, e);
                    self.on_dropped(index, &mut results);
                }
            }
        }

        if !report.abandoned.is_empty() {
            tracing::warn!(
                "Batch {} hit its {:?} deadline; abandoning {} unfinished records",
                batch.number,
                self.limits.overall_deadline.unwrap_or_default(),
                report.abandoned.len()
            );
            for index in report.abandoned {
                self.on_dropped(index, &mut results);
            }
        }

        results.sort_by_key(|r| r.index);

        tracing::info!(
            "Completed batch {} processing in {:.2} seconds",
            batch.number,
            start.elapsed().as_secs_f64()
        );
        results
    }

    fn on_dropped(&self, index: usize, results: &mut Vec<ProcessingResult>) {
        if self.dropped_rows == DroppedRowPolicy::Sentinel {
            results.push(ProcessingResult::failed(index));
        }
    }
}
