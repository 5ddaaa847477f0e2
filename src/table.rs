use crate::error::{AugmentError, Result};
use crate::types::{Dataset, ProcessingResult, RESPONSE_COLUMN};

/// The augmented output: the original columns plus a `Response` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl FinalTable {
    /// Join sorted results back onto their original rows.
    ///
    /// Results whose index is outside the dataset are ignored.
    pub fn render(dataset: &Dataset, results: &[ProcessingResult]) -> Self {
        let mut header = dataset.columns().to_vec();
        header.push(RESPONSE_COLUMN.to_string());

        let rows = results
            .iter()
            .filter_map(|result| {
                dataset.row(result.index).map(|row| {
                    let mut out = Vec::with_capacity(row.len() + 1);
                    out.extend_from_slice(row);
                    out.push(result.response.clone());
                    out
                })
            })
            .collect();

        Self { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows, header excluded.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serialize as CSV, header first.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| AugmentError::Io(e.into_error()))
    }
}
