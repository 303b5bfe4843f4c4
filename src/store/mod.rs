//! Persistent task dataset: row model, tabular I/O and the serialized store.

pub mod dataset;
pub mod task;
pub mod task_store;

pub use dataset::{CsvDataset, Dataset, DatasetIo};
pub use task::{Task, TaskStatus, UnknownStatus};
pub use task_store::{LEGACY_ID_PREFIX, StatusChange, TaskStore};
