use crate::client::CompletionClient;
use crate::error::{AugmentError, Result};
use crate::progress::ProgressCounter;
use crate::prompt;
use crate::retry::RetryingCaller;
use crate::types::{JobRequest, ProcessingRequest, ProcessingResult};
use std::time::Instant;

/// Per-run prompt settings shared by every row.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    /// Column whose cell becomes the row's input text.
    pub column_index: usize,
    pub system_prompt: String,
    pub model: String,
    pub temperature: f64,
}

impl From<&JobRequest> for PromptSettings {
    fn from(req: &JobRequest) -> Self {
        Self {
            column_index: req.column_index,
            system_prompt: req.system_prompt.clone(),
            model: req.model.clone(),
            temperature: req.temperature,
        }
    }
}

impl PromptSettings {
    /// Build the request for one row.
    pub fn request_for(&self, index: usize, row: &[String]) -> Result<ProcessingRequest> {
        let input_text = row.get(self.column_index).ok_or_else(|| {
            AugmentError::Other(format!(
                "row {} has {} columns, no column {}",
                index,
                row.len(),
                self.column_index
            ))
        })?;

        Ok(ProcessingRequest {
            index,
            input_text: input_text.clone(),
            prompt: prompt::render(&self.system_prompt, input_text),
            model: self.model.clone(),
            temperature: self.temperature,
        })
    }
}

/// Produces the completion for a single row.
pub struct RowProcessor<C> {
    caller: RetryingCaller<C>,
    progress: ProgressCounter,
}

impl<C> Clone for RowProcessor<C> {
    fn clone(&self) -> Self {
        Self {
            caller: self.caller.clone(),
            progress: self.progress.clone(),
        }
    }
}

impl<C: CompletionClient> RowProcessor<C> {
    pub fn new(caller: RetryingCaller<C>, progress: ProgressCounter) -> Self {
        Self { caller, progress }
    }

    pub fn progress(&self) -> &ProgressCounter {
        &self.progress
    }

    /// Process one row. Always yields a result for `index`; failures become
    /// the error sentinel. The progress counter is bumped exactly once.
    pub async fn process(
        &self,
        index: usize,
        row: &[String],
        settings: &PromptSettings,
    ) -> ProcessingResult {
        let result = match settings.request_for(index, row) {
            Ok(request) => self.run(request).await,
            Err(e) => {
                tracing::error!("Error processing row at index {}: {}", index, e);
                ProcessingResult::failed(index)
            }
        };

        self.progress.increment();
        result
    }

    async fn run(&self, request: ProcessingRequest) -> ProcessingResult {
        tracing::debug!(
            "Processing record at index {} with content: {}...",
            request.index,
            prompt::preview(&request.input_text)
        );
        let start = Instant::now();

        let response = self
            .caller
            .call(&request.prompt, &request.model, request.temperature)
            .await;

        tracing::debug!(
            "Completed processing for index {}. Time taken: {:.2} seconds",
            request.index,
            start.elapsed().as_secs_f64()
        );
        ProcessingResult::new(request.index, response)
    }
}
