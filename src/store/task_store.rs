//! Serialized access to the task dataset.
//!
//! Every public operation takes the same writer lock for its whole
//! load → mutate → rewrite span. Overlapping scheduler triggers therefore
//! cannot lose each other's updates, which is the one correctness-critical
//! invariant of the whole engine.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::error::{Result, StoreError, TaskError};
use crate::store::dataset::{CsvDataset, Dataset, DatasetIo};
use crate::store::task::{Task, TaskStatus};
use crate::time;

/// Prefix carried by ids in datasets using the legacy naming convention.
pub const LEGACY_ID_PREFIX: &str = "TASK-";

/// A status write decided by a [`TaskStore::transition_at`] guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// New status.
    pub status: TaskStatus,
    /// Value for the `Responded By` column.
    pub responded_by: String,
}

impl StatusChange {
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            responded_by: String::new(),
        }
    }

    #[must_use]
    pub fn by(mut self, responded_by: impl Into<String>) -> Self {
        self.responded_by = responded_by.into();
        self
    }
}

/// Authoritative, lock-serialized task dataset.
pub struct TaskStore {
    io: Box<dyn DatasetIo>,
    legacy_prefix: String,
    lock: Mutex<()>,
}

impl TaskStore {
    /// Create a store over any dataset backend.
    pub fn new(io: impl DatasetIo + 'static) -> Self {
        Self {
            io: Box::new(io),
            legacy_prefix: LEGACY_ID_PREFIX.to_owned(),
            lock: Mutex::new(()),
        }
    }

    /// Create a store backed by a CSV file.
    pub fn open_csv(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(CsvDataset::new(path))
    }

    /// Override the legacy id prefix (empty disables the fallback lookup).
    #[must_use]
    pub fn with_legacy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.legacy_prefix = prefix.into();
        self
    }

    fn guard(&self) -> std::result::Result<MutexGuard<'_, ()>, StoreError> {
        self.lock.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Every task, in dataset order.
    pub fn load_all(&self) -> Result<Vec<Task>> {
        let _guard = self.guard()?;
        Ok(self.io.load_all()?.tasks()?)
    }

    /// Look a task up by id (exact match, then legacy-prefixed match).
    pub fn find_by_id(&self, id: &str) -> Result<Task> {
        let _guard = self.guard()?;
        let dataset = self.io.load_all()?;
        let row = dataset
            .position(id, &self.legacy_prefix)
            .ok_or_else(|| TaskError::NotFound(id.to_owned()))?;
        Ok(dataset.task_at(row)?)
    }

    /// Tasks currently in `status`, in dataset order.
    pub fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|task| task.status == status)
            .collect())
    }

    /// Pending tasks whose execution time has arrived.
    pub fn list_ready(&self) -> Result<Vec<Task>> {
        self.list_ready_at(Local::now())
    }

    /// [`list_ready`](Self::list_ready) evaluated at an explicit instant.
    pub fn list_ready_at(&self, now: DateTime<Local>) -> Result<Vec<Task>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|task| Self::is_ready_at(task, now))
            .collect())
    }

    /// Whether `task` should be dispatched now.
    #[must_use]
    pub fn is_ready(task: &Task) -> bool {
        Self::is_ready_at(task, Local::now())
    }

    /// Readiness predicate at an explicit instant.
    ///
    /// An unparseable execution time counts as "no execution time": bad
    /// schedule data degrades to immediate dispatch, never to exclusion.
    #[must_use]
    pub fn is_ready_at(task: &Task, now: DateTime<Local>) -> bool {
        if task.status != TaskStatus::Pending {
            return false;
        }
        if task.execution_time.trim().is_empty() {
            return true;
        }
        match time::to_instant_on(&task.execution_time, now.date_naive()) {
            Some(scheduled) => scheduled <= now,
            None => {
                debug!(
                    task_id = %task.id,
                    execution_time = %task.execution_time,
                    "unparseable execution time, treating task as ready"
                );
                true
            }
        }
    }

    /// Set one task's status, stamping the response time with "now".
    pub fn update_status(&self, id: &str, status: TaskStatus, responded_by: &str) -> Result<Task> {
        self.update_status_at(id, status, responded_by, Local::now())
    }

    /// [`update_status`](Self::update_status) with an explicit timestamp.
    pub fn update_status_at(
        &self,
        id: &str,
        status: TaskStatus,
        responded_by: &str,
        now: DateTime<Local>,
    ) -> Result<Task> {
        self.transition_at(id, now, |_| Ok(StatusChange::to(status).by(responded_by)))
    }

    /// Check-and-set on one task inside a single critical section.
    ///
    /// `decide` sees the current row and either returns the change to apply
    /// or an error, in which case nothing is written.
    pub fn transition_at<F>(&self, id: &str, now: DateTime<Local>, decide: F) -> Result<Task>
    where
        F: FnOnce(&Task) -> Result<StatusChange>,
    {
        let _guard = self.guard()?;
        let mut dataset = self.io.load_all()?;
        let row = dataset
            .position(id, &self.legacy_prefix)
            .ok_or_else(|| TaskError::NotFound(id.to_owned()))?;

        let current = dataset.task_at(row)?;
        let change = decide(&current)?;
        dataset.apply_status(
            row,
            change.status,
            &time::format_timestamp(now),
            &change.responded_by,
        );
        self.io.rewrite_all(&dataset)?;

        info!(task_id = %current.id, from = %current.status, to = %change.status, "task status updated");
        Ok(dataset.task_at(row)?)
    }

    /// Apply `decide` to every row in one critical section and one rewrite.
    ///
    /// Returns the changed tasks (post-change) in dataset order. Nothing is
    /// written when no row changes.
    pub fn transition_all_at<F>(&self, now: DateTime<Local>, mut decide: F) -> Result<Vec<Task>>
    where
        F: FnMut(&Task) -> Option<StatusChange>,
    {
        let _guard = self.guard()?;
        let mut dataset = self.io.load_all()?;
        let stamp = time::format_timestamp(now);

        let mut changed_rows = Vec::new();
        for (row, task) in dataset.tasks()?.iter().enumerate() {
            if let Some(change) = decide(task) {
                dataset.apply_status(row, change.status, &stamp, &change.responded_by);
                changed_rows.push(row);
            }
        }

        if changed_rows.is_empty() {
            return Ok(Vec::new());
        }
        self.io.rewrite_all(&dataset)?;
        Ok(changed_rows
            .into_iter()
            .map(|row| dataset.task_at(row))
            .collect::<std::result::Result<_, _>>()?)
    }

    /// Return every row to Pending with empty response metadata.
    ///
    /// Returns the number of rows in the dataset.
    pub fn reset_all(&self) -> Result<usize> {
        let _guard = self.guard()?;
        let mut dataset = self.io.load_all()?;
        dataset.validate()?;
        for row in 0..dataset.len() {
            dataset.apply_status(row, TaskStatus::Pending, "", "");
        }
        self.io.rewrite_all(&dataset)?;
        info!(rows = dataset.len(), "all tasks reset to pending");
        Ok(dataset.len())
    }

    /// Run `f` against the on-disk dataset while holding the writer lock.
    pub fn with_locked_source<R>(&self, f: impl FnOnce(&Path) -> R) -> Result<R> {
        let _guard = self.guard()?;
        let path = self
            .io
            .source_path()
            .ok_or_else(|| StoreError::Read("dataset has no on-disk source".to_owned()))?;
        if !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()).into());
        }
        Ok(f(path))
    }

    /// Raw dataset snapshot (header + cells), for diagnostics and tests.
    pub fn snapshot(&self) -> Result<Dataset> {
        let _guard = self.guard()?;
        Ok(self.io.load_all()?)
    }
}
