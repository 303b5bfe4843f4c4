//! Daily dataset snapshots.
//!
//! One file per local calendar day, named `tasks-YYYY-MM-DD.csv`. Because
//! names sort chronologically, listing and retention work on file names
//! alone.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Result, TaskError};

const ARCHIVE_PREFIX: &str = "tasks-";
const ARCHIVE_EXT: &str = ".csv";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A snapshot found in the archive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ArchiveEntry {
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Durable daily copies of the task dataset.
pub trait ArchiveStore: Send + Sync {
    /// Whether a snapshot for `date` already exists.
    fn archive_exists(&self, date: NaiveDate) -> bool;

    /// Copy `source` into the snapshot for `date`, returning its path.
    fn archive(&self, source: &Path, date: NaiveDate) -> Result<PathBuf>;

    /// All snapshots, newest first.
    fn list(&self) -> Result<Vec<ArchiveEntry>>;

    /// Delete snapshots dated more than `retention_days` before `today`.
    ///
    /// Returns the number of deleted files.
    fn prune(&self, today: NaiveDate, retention_days: u32) -> Result<usize>;
}

/// Archive store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    dir: PathBuf,
}

impl FsArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for a given day.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{ARCHIVE_PREFIX}{}{ARCHIVE_EXT}",
            date.format(DATE_FORMAT)
        ))
    }
}

fn parse_archive_name(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(ARCHIVE_PREFIX)?.strip_suffix(ARCHIVE_EXT)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

fn archive_error(action: &str, path: &Path, err: std::io::Error) -> TaskError {
    TaskError::Archive(format!("{action} {}: {err}", path.display()))
}

impl ArchiveStore for FsArchiveStore {
    fn archive_exists(&self, date: NaiveDate) -> bool {
        self.path_for(date).exists()
    }

    fn archive(&self, source: &Path, date: NaiveDate) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| archive_error("cannot create", &self.dir, e))?;

        let target = self.path_for(date);
        let temp = target.with_extension("csv.tmp");
        std::fs::copy(source, &temp).map_err(|e| archive_error("cannot copy to", &temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            archive_error("cannot finalize", &target, e)
        })?;
        Ok(target)
    }

    fn list(&self) -> Result<Vec<ArchiveEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| archive_error("cannot read", &self.dir, e))?;

        let mut archives: Vec<ArchiveEntry> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                let date = parse_archive_name(&name)?;
                let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                Some(ArchiveEntry {
                    date,
                    path: entry.path(),
                    size_bytes,
                })
            })
            .collect();

        archives.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(archives)
    }

    fn prune(&self, today: NaiveDate, retention_days: u32) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0);
        }
        let Some(cutoff) = today.checked_sub_days(chrono::Days::new(u64::from(retention_days)))
        else {
            return Ok(0);
        };

        let mut deleted = 0;
        for old in self.list()?.into_iter().filter(|entry| entry.date < cutoff) {
            match std::fs::remove_file(&old.path) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(path = %old.path.display(), error = %e, "failed to delete old archive");
                }
            }
        }
        Ok(deleted)
    }
}
