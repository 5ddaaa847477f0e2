use crate::{
    batch::BatchProcessor,
    client::CompletionClient,
    config::PipelineConfig,
    error::Result,
    pool::{self, PoolLimits, TaskOutcome},
    progress::ProgressCounter,
    retry::RetryingCaller,
    row::{PromptSettings, RowProcessor},
    storage::{DatasetLoader, ResultSink},
    table::FinalTable,
    types::{Dataset, JobRequest, ProcessingResult, RunReport},
    AugmentError,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Phases of one pipeline run, in order. None is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Loading,
    Batching,
    Dispatching,
    Collecting,
    Rendering,
    Uploading,
    Done,
}

type StageObserver = Arc<dyn Fn(RunStage) + Send + Sync>;
type ProgressObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// Two-level batch orchestrator.
///
/// The dataset is split into fixed-size batches; up to `batch_concurrency`
/// batches run at once, each fanning its rows out to `row_concurrency`
/// workers. Results come back in completion order and are re-sorted by
/// original index, so the output table always follows the input order.
pub struct Pipeline<C> {
    client: Arc<C>,
    config: PipelineConfig,
    on_stage: Option<StageObserver>,
    on_progress: Option<ProgressObserver>,
}

impl<C> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("has_stage_observer", &self.on_stage.is_some())
            .field("has_progress_observer", &self.on_progress.is_some())
            .finish()
    }
}

/// What a dispatch/collect pass produced.
struct Execution {
    table: FinalTable,
    batches: usize,
    processed: usize,
}

impl<C: CompletionClient> Pipeline<C> {
    /// Create a new pipeline builder around a completion client.
    pub fn builder(client: C) -> PipelineBuilder<C> {
        PipelineBuilder::new(client)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn enter(&self, stage: RunStage) {
        tracing::debug!("Pipeline stage: {:?}", stage);
        if let Some(ref observer) = self.on_stage {
            observer(stage);
        }
    }

    /// Load, process, render and upload one dataset.
    ///
    /// Fails only if the configuration is invalid or the dataset can't be
    /// loaded. An upload failure is logged and reported as a missing
    /// `location` on the returned [`RunReport`].
    pub async fn run<L, S>(&self, loader: &L, sink: &S, request: &JobRequest) -> Result<RunReport>
    where
        L: DatasetLoader,
        S: ResultSink,
    {
        self.config.validate()?;
        let start = Instant::now();

        self.enter(RunStage::Loading);
        let dataset = loader
            .load(&request.source_locator)
            .await
            .map_err(|e| match e {
                AugmentError::Load(_) => e,
                other => AugmentError::Load(format!("{}: {}", request.source_locator, other)),
            })?
            .truncate(request.max_rows);
        let input_rows = dataset.len();

        let execution = self
            .execute(Arc::new(dataset), Arc::new(PromptSettings::from(request)))
            .await;

        self.enter(RunStage::Uploading);
        let location = match self.upload(sink, &execution.table).await {
            Ok(url) => {
                tracing::info!("Uploaded results to {}", url);
                Some(url)
            }
            Err(e) => {
                tracing::error!("Error uploading results: {}", e);
                None
            }
        };

        let report = RunReport {
            location,
            input_rows,
            output_rows: execution.table.len(),
            batches: execution.batches,
            processed: execution.processed,
            elapsed: start.elapsed(),
        };

        if report.missing_rows() > 0 {
            tracing::warn!(
                "Output has {} of {} input rows; {} rows were dropped",
                report.output_rows,
                report.input_rows,
                report.missing_rows()
            );
        }

        self.enter(RunStage::Done);
        tracing::info!(
            "Processing completed in {:.2} seconds",
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Process an already-loaded dataset and return the augmented table
    /// without uploading it.
    pub async fn process(&self, dataset: Dataset, settings: PromptSettings) -> Result<FinalTable> {
        self.config.validate()?;
        let execution = self.execute(Arc::new(dataset), Arc::new(settings)).await;
        Ok(execution.table)
    }

    async fn execute(&self, dataset: Arc<Dataset>, settings: Arc<PromptSettings>) -> Execution {
        self.enter(RunStage::Batching);
        let batches = dataset.batches(self.config.batch_size);
        tracing::info!(
            "Processing {} batches with a batch size of {}.",
            batches.len(),
            self.config.batch_size
        );

        let mut progress = ProgressCounter::new();
        if let Some(ref observer) = self.on_progress {
            let observer = Arc::clone(observer);
            progress = progress.with_observer(move |n| observer(n));
        }
        let caller = RetryingCaller::new(
            Arc::clone(&self.client),
            self.config.retry.clone(),
            self.config.max_tokens,
        );
        let processor = BatchProcessor::new(RowProcessor::new(caller, progress.clone()), &self.config);

        self.enter(RunStage::Dispatching);
        let tasks = batches.iter().map(|&batch| {
            let processor = processor.clone();
            let dataset = Arc::clone(&dataset);
            let settings = Arc::clone(&settings);
            (batch.number, async move {
                processor.process(dataset, batch, settings).await
            })
        });
        let report = pool::run_bounded(tasks, PoolLimits::new(self.config.batch_concurrency)).await;

        self.enter(RunStage::Collecting);
        let mut all_results: Vec<ProcessingResult> = Vec::with_capacity(dataset.len());
        for (number, outcome) in report.outcomes {
            match outcome {
                TaskOutcome::Completed(results) => all_results.extend(results),
                TaskOutcome::TimedOut => {
                    tracing::error!("Batch {} timed out; its rows are lost", number);
                }
                TaskOutcome::Failed(e) => {
                    tracing::error!("Batch processing error in batch {}: {}", number, e);
                }
            }
        }
        all_results.sort_by_key(|r| r.index);

        self.enter(RunStage::Rendering);
        let table = FinalTable::render(&dataset, &all_results);

        Execution {
            table,
            batches: batches.len(),
            processed: progress.get(),
        }
    }

    async fn upload<S: ResultSink>(&self, sink: &S, table: &FinalTable) -> Result<String> {
        let body = table.to_csv()?;
        sink.upload(&self.config.output_key, body).await
    }
}

/// Builder for creating pipelines.
pub struct PipelineBuilder<C> {
    client: C,
    config: PipelineConfig,
    on_stage: Option<StageObserver>,
    on_progress: Option<ProgressObserver>,
}

impl<C: CompletionClient> PipelineBuilder<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            config: PipelineConfig::default(),
            on_stage: None,
            on_progress: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Called on entry to every [`RunStage`].
    pub fn with_stage_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(RunStage) + Send + Sync + 'static,
    {
        self.on_stage = Some(Arc::new(observer));
        self
    }

    /// Called with the running row count every 100 finished rows.
    pub fn with_progress_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(observer));
        self
    }

    /// Build the pipeline, validating configuration.
    pub fn build(self) -> Result<Pipeline<C>> {
        self.config.validate()?;
        Ok(Pipeline {
            client: Arc::new(self.client),
            config: self.config,
            on_stage: self.on_stage,
            on_progress: self.on_progress,
        })
    }
}
