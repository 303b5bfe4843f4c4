//! Tabular dataset I/O.
//!
//! The dataset is kept as raw header + string cells so that columns the
//! engine does not know about (including blank header names) survive a
//! load/rewrite cycle untouched. [`Task`] values are decoded views over it.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::store::task::{Task, TaskStatus};

pub const COL_TASK_ID: &str = "TaskID";
pub const COL_NAME: &str = "Task Name";
pub const COL_DESCRIPTION: &str = "Description";
pub const COL_EXECUTION_TIME: &str = "Execution Time";
pub const COL_STATUS: &str = "Status";
pub const COL_RESPONSE_TIME: &str = "Response Time";
pub const COL_RESPONDED_BY: &str = "Responded By";

/// Column order used when a dataset is created from scratch.
pub const DEFAULT_COLUMNS: [&str; 8] = [
    COL_NAME,
    COL_DESCRIPTION,
    COL_EXECUTION_TIME,
    COL_STATUS,
    COL_RESPONSE_TIME,
    COL_RESPONDED_BY,
    "",
    COL_TASK_ID,
];

/// Ordered rows plus the header they were read with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Empty dataset with the given column order.
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a dataset in [`DEFAULT_COLUMNS`] order from task values.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut dataset = Self::new(DEFAULT_COLUMNS.iter().map(|c| (*c).to_owned()).collect());
        for task in tasks {
            dataset.push_task(task);
        }
        dataset
    }

    /// Append a row built from `task`, leaving unknown columns blank.
    pub fn push_task(&mut self, task: &Task) {
        let mut row = vec![String::new(); self.headers.len()];
        for (idx, header) in self.headers.iter().enumerate() {
            row[idx] = match header.trim() {
                COL_TASK_ID => task.id.clone(),
                COL_NAME => task.name.clone(),
                COL_DESCRIPTION => task.description.clone(),
                COL_EXECUTION_TIME => task.execution_time.clone(),
                COL_STATUS => task.status.as_str().to_owned(),
                COL_RESPONSE_TIME => task.response_time.clone(),
                COL_RESPONDED_BY => task.responded_by.clone(),
                _ => String::new(),
            };
        }
        self.rows.push(row);
    }

    /// Append a raw row; it must match the header width.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), StoreError> {
        if row.len() != self.headers.len() {
            return Err(StoreError::Malformed(format!(
                "row {} has {} cells, header has {}",
                self.rows.len() + 1,
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Index of `name`, appending an empty column when it is missing.
    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.headers.push(name.to_owned());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Check the structural requirements every operation relies on.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.column(COL_TASK_ID).is_none() {
            return Err(StoreError::Malformed(format!(
                "missing {COL_TASK_ID} column"
            )));
        }
        Ok(())
    }

    fn cell(&self, row: usize, column: Option<usize>) -> String {
        column
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .cloned()
            .unwrap_or_default()
    }

    /// Decode the row at `row` into a [`Task`].
    pub fn task_at(&self, row: usize) -> Result<Task, StoreError> {
        let status_raw = self.cell(row, self.column(COL_STATUS));
        let status: TaskStatus = status_raw
            .parse()
            .map_err(|e| StoreError::Malformed(format!("row {}: {e}", row + 1)))?;

        Ok(Task {
            id: self.cell(row, self.column(COL_TASK_ID)),
            name: self.cell(row, self.column(COL_NAME)),
            description: self.cell(row, self.column(COL_DESCRIPTION)),
            execution_time: self.cell(row, self.column(COL_EXECUTION_TIME)),
            status,
            response_time: self.cell(row, self.column(COL_RESPONSE_TIME)),
            responded_by: self.cell(row, self.column(COL_RESPONDED_BY)),
        })
    }

    /// Decode every row, in dataset order.
    pub fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.validate()?;
        (0..self.rows.len()).map(|row| self.task_at(row)).collect()
    }

    /// Row index of `id`: exact match first, then `{prefix}{id}`.
    ///
    /// The prefixed fallback exists for datasets written with the legacy
    /// `TASK-` naming. Remove it once those are retired.
    pub fn position(&self, id: &str, legacy_prefix: &str) -> Option<usize> {
        let column = self.column(COL_TASK_ID)?;
        let id = id.trim();
        let exact = self.rows.iter().position(|row| row[column].trim() == id);
        if exact.is_some() || legacy_prefix.is_empty() {
            return exact;
        }
        let prefixed = format!("{legacy_prefix}{id}");
        self.rows.iter().position(|row| row[column].trim() == prefixed)
    }

    /// Write a status transition onto one row.
    pub fn apply_status(
        &mut self,
        row: usize,
        status: TaskStatus,
        response_time: &str,
        responded_by: &str,
    ) {
        let status_col = self.ensure_column(COL_STATUS);
        let time_col = self.ensure_column(COL_RESPONSE_TIME);
        let by_col = self.ensure_column(COL_RESPONDED_BY);
        if let Some(cells) = self.rows.get_mut(row) {
            cells[status_col] = status.as_str().to_owned();
            cells[time_col] = response_time.to_owned();
            cells[by_col] = responded_by.to_owned();
        }
    }
}

/// Storage backend for the task dataset.
pub trait DatasetIo: Send + Sync {
    /// Read every row in order together with the header.
    fn load_all(&self) -> Result<Dataset, StoreError>;

    /// Replace the stored dataset with `dataset` as one unit.
    fn rewrite_all(&self, dataset: &Dataset) -> Result<(), StoreError>;

    /// On-disk location, when the backend has one.
    fn source_path(&self) -> Option<&Path>;
}

/// CSV file backend.
///
/// Rewrites go through a sibling temp file that is fsynced and renamed over
/// the original, so readers never observe a half-written dataset.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    path: PathBuf,
}

impl CsvDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("csv.tmp")
    }
}

impl DatasetIo for CsvDataset {
    fn load_all(&self) -> Result<Dataset, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::Missing(self.path.clone()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(&self.path)
            .map_err(|e| read_error(&self.path, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| read_error(&self.path, e))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_owned())
            .collect();

        let mut dataset = Dataset::new(headers);
        for record in reader.records() {
            let record = record.map_err(|e| read_error(&self.path, e))?;
            dataset.push_row(record.iter().map(str::to_owned).collect())?;
        }

        dataset.validate()?;
        Ok(dataset)
    }

    fn rewrite_all(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let tmp_path = self.temp_path();
        let file = std::fs::File::create(&tmp_path).map_err(|e| {
            StoreError::Write(format!(
                "failed to create temp file '{}': {e}",
                tmp_path.display()
            ))
        })?;

        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(dataset.headers())
            .map_err(|e| StoreError::Write(e.to_string()))?;
        for row in dataset.rows() {
            writer
                .write_record(row)
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Write(e.to_string()))?;
        file.sync_all()
            .map_err(|e| StoreError::Write(format!("failed to sync temp file: {e}")))?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            StoreError::Write(format!(
                "failed to rename '{}' to '{}': {e}",
                tmp_path.display(),
                self.path.display()
            ))
        })
    }

    fn source_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn read_error(path: &Path, err: csv::Error) -> StoreError {
    match err.kind() {
        csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            StoreError::Missing(path.to_path_buf())
        }
        csv::ErrorKind::UnequalLengths { .. } | csv::ErrorKind::Utf8 { .. } => {
            StoreError::Malformed(err.to_string())
        }
        _ => StoreError::Read(err.to_string()),
    }
}
