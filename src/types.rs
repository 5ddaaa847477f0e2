use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

/// Response text recorded for a row whose completion could not be produced.
pub const ERROR_SENTINEL: &str = "Error: Unable to process";

/// Name of the column appended to the output table.
pub const RESPONSE_COLUMN: &str = "Response";

/// An ordered, read-only table of string cells.
///
/// Row positions are the zero-based original indices that every result
/// is keyed on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the first `max_rows` rows.
    pub fn truncate(mut self, max_rows: usize) -> Self {
        self.rows.truncate(max_rows);
        self
    }

    /// Partition the rows into contiguous batches of at most `batch_size`.
    ///
    /// Batches cover every row exactly once, in ascending order. A zero
    /// `batch_size` yields no batches; [`PipelineConfig::validate`] rejects it
    /// before a run gets here.
    ///
    /// [`PipelineConfig::validate`]: crate::PipelineConfig::validate
    pub fn batches(&self, batch_size: usize) -> Vec<Batch> {
        if batch_size == 0 {
            return Vec::new();
        }
        (0..self.len())
            .step_by(batch_size)
            .enumerate()
            .map(|(number, start)| Batch {
                number,
                start,
                end: (start + batch_size).min(self.len()),
            })
            .collect()
    }
}

/// A contiguous slice `[start, end)` of a [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// Zero-based position of this batch in the run.
    pub number: usize,
    pub start: usize,
    pub end: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Original row indices covered by this batch.
    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Everything needed to produce one row's completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    pub index: usize,
    pub input_text: String,
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
}

/// One row's outcome, keyed by its original index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub index: usize,
    pub response: String,
}

impl ProcessingResult {
    pub fn new(index: usize, response: impl Into<String>) -> Self {
        Self {
            index,
            response: response.into(),
        }
    }

    /// A result carrying the error sentinel.
    pub fn failed(index: usize) -> Self {
        Self::new(index, ERROR_SENTINEL)
    }

    pub fn is_error(&self) -> bool {
        self.response == ERROR_SENTINEL
    }
}

/// The invocation record accepted by the entry point.
///
/// Numeric fields accept JSON numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobRequest {
    #[serde(alias = "s3_file_url")]
    pub source_locator: String,

    #[serde(deserialize_with = "lenient_number")]
    pub column_index: usize,

    #[serde(deserialize_with = "lenient_number")]
    pub max_rows: usize,

    pub system_prompt: String,

    pub model: String,

    #[serde(deserialize_with = "lenient_number")]
    pub temperature: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText<T> {
    Number(T),
    Text(String),
}

fn lenient_number<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match NumberOrText::<T>::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Summary of a finished pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Where the output landed. `None` when the upload failed.
    pub location: Option<String>,
    /// Rows after truncation to `max_rows`.
    pub input_rows: usize,
    /// Data rows in the rendered table.
    pub output_rows: usize,
    pub batches: usize,
    /// Rows that reached the progress counter, successful or not.
    pub processed: usize,
    pub elapsed: Duration,
}

impl RunReport {
    /// Rows that entered the pipeline but are absent from the output.
    pub fn missing_rows(&self) -> usize {
        self.input_rows.saturating_sub(self.output_rows)
    }

    pub fn is_degraded(&self) -> bool {
        self.location.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Dataset {
        Dataset::new(
            vec!["id".into(), "text".into()],
            (0..n).map(|i| vec![i.to_string(), format!("row {}", i)]).collect(),
        )
    }

    #[test]
    fn test_batches_partition_exactly() {
        let batches = dataset(2500).batches(1000);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(batches[0].indices(), 0..1000);
        assert_eq!(batches[2].indices(), 2000..2500);
        for pair in batches.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(batches.iter().map(|b| b.number).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_small_dataset_single_batch() {
        let batches = dataset(7).batches(1000);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 7);
    }

    #[test]
    fn test_empty_dataset_no_batches() {
        assert!(dataset(0).batches(1000).is_empty());
        assert!(dataset(5).batches(0).is_empty());
    }

    #[test]
    fn test_truncate() {
        let ds = dataset(10).truncate(3);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.row(2).unwrap()[1], "row 2");
        assert!(ds.row(3).is_none());

        let ds = dataset(2).truncate(100);
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_processing_result_sentinel() {
        let r = ProcessingResult::failed(4);
        assert!(r.is_error());
        assert_eq!(r.response, "Error: Unable to process");
        assert!(!ProcessingResult::new(4, "fine").is_error());
    }

    #[test]
    fn test_job_request_lenient_numbers() {
        let json = r#"{
            "s3_file_url": "https://bucket.s3.amazonaws.com/data.csv",
            "column_index": "2",
            "max_rows": 19900,
            "system_prompt": "Summarize the text.",
            "model": "gpt-4o-mini",
            "temperature": "0.1"
        }"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.source_locator, "https://bucket.s3.amazonaws.com/data.csv");
        assert_eq!(req.column_index, 2);
        assert_eq!(req.max_rows, 19900);
        assert_eq!(req.temperature, 0.1);
    }

    #[test]
    fn test_job_request_rejects_garbage_number() {
        let json = r#"{
            "source_locator": "data.csv",
            "column_index": "two",
            "max_rows": 1,
            "system_prompt": "",
            "model": "m",
            "temperature": 0
        }"#;
        assert!(serde_json::from_str::<JobRequest>(json).is_err());
    }

    #[test]
    fn test_run_report_missing_rows() {
        let report = RunReport {
            location: None,
            input_rows: 2500,
            output_rows: 2499,
            batches: 3,
            processed: 2499,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(report.missing_rows(), 1);
        assert!(report.is_degraded());
    }
}
