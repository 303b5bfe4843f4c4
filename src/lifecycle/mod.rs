//! Task lifecycle: state transitions, delivery, reminders, expiry and
//! daily maintenance.

pub mod cache;
pub mod delivery;
pub mod engine;
pub mod message_log;
pub mod notices;
pub mod report;

pub use cache::PendingResponse;
pub use delivery::{RetryPolicy, send_with_retry};
pub use engine::{ArchiveOutcome, DispatchReport, FollowUpSent, LifecycleEngine, PendingSnapshot};
pub use report::StatusReport;
