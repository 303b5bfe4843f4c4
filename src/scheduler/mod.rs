//! Timed lifecycle triggers.
//!
//! Dispatch, expiry, follow-up and status report run on fixed intervals;
//! archive and reset run once a day. All cadences are UTC.

pub mod runner;
pub mod tasks;

pub use runner::{Scheduler, SchedulerHandle};
pub use tasks::{
    Schedule, ScheduledTrigger, TriggerKind, TriggerOutcome, TriggerRunRecord, default_triggers,
    execute_trigger,
};
