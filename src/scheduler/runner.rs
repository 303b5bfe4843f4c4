//! Scheduler background loops.
//!
//! Each trigger gets its own tokio task that sleeps until the next fire
//! time and then runs the trigger to completion. Triggers are independent:
//! a slow dispatch cycle never delays expiry, and nothing stops two
//! different triggers from running at once. Cancellation only interrupts
//! the sleeps, so in-flight cycles always finish.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::lifecycle::LifecycleEngine;
use crate::scheduler::tasks::{
    ScheduledTrigger, TriggerKind, TriggerOutcome, TriggerRunRecord, execute_trigger,
};

/// Number of run-history entries to keep.
const DEFAULT_HISTORY_LIMIT: usize = 400;

type SharedHistory = Arc<Mutex<VecDeque<TriggerRunRecord>>>;

/// Drives lifecycle triggers on their schedules.
pub struct Scheduler {
    engine: Arc<LifecycleEngine>,
    triggers: Vec<ScheduledTrigger>,
    history: SharedHistory,
    max_history_entries: usize,
}

impl Scheduler {
    pub fn new(engine: Arc<LifecycleEngine>, triggers: Vec<ScheduledTrigger>) -> Self {
        Self {
            engine,
            triggers,
            history: Arc::new(Mutex::new(VecDeque::new())),
            max_history_entries: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Override the in-memory run-history limit.
    #[must_use]
    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.max_history_entries = max_entries.max(1);
        self
    }

    #[must_use]
    pub fn triggers(&self) -> &[ScheduledTrigger] {
        &self.triggers
    }

    /// Run one trigger now and record it in the history.
    pub async fn run_once(&self, kind: TriggerKind) -> TriggerRunRecord {
        let record = run_and_log(&self.engine, kind).await;
        push_history(&self.history, record.clone(), self.max_history_entries);
        record
    }

    /// Spawn one loop per trigger. Cancel `cancel` to stop them.
    pub fn run(self, cancel: CancellationToken) -> SchedulerHandle {
        let mut tasks = JoinSet::new();
        for trigger in &self.triggers {
            info!(trigger = %trigger.kind, schedule = %trigger.schedule, "trigger scheduled");
            tasks.spawn(trigger_loop(
                *trigger,
                Arc::clone(&self.engine),
                Arc::clone(&self.history),
                self.max_history_entries,
                cancel.clone(),
            ));
        }
        info!("scheduler started with {} triggers", self.triggers.len());

        SchedulerHandle {
            cancel,
            tasks,
            history: self.history,
        }
    }
}

/// Running scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    history: SharedHistory,
}

impl SchedulerHandle {
    /// Stop scheduling new cycles.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every trigger loop (and any cycle still running) to finish.
    pub async fn join(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("scheduler trigger loop panicked: {e}");
            }
        }
        info!("scheduler stopped");
    }

    /// Recent runs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TriggerRunRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

async fn trigger_loop(
    trigger: ScheduledTrigger,
    engine: Arc<LifecycleEngine>,
    history: SharedHistory,
    max_history_entries: usize,
    cancel: CancellationToken,
) {
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        let from = last_fire.map_or(now, |last| last.max(now));
        let next = trigger.schedule.next_fire_after(from);
        let wait = (next - now).to_std().unwrap_or_default();
        debug!(trigger = %trigger.kind, next = %next, "waiting for next fire");

        tokio::select! {
            () = cancel.cancelled() => {
                debug!(trigger = %trigger.kind, "trigger loop cancelled");
                break;
            }
            () = tokio::time::sleep(wait) => {}
        }

        last_fire = Some(next);
        let record = run_and_log(&engine, trigger.kind).await;
        push_history(&history, record, max_history_entries);
    }
}

async fn run_and_log(engine: &LifecycleEngine, kind: TriggerKind) -> TriggerRunRecord {
    let started_at = Utc::now();
    let result = execute_trigger(engine, kind).await;
    let finished_at = Utc::now();

    let (outcome, summary) = match result {
        Ok(summary) => {
            info!(trigger = %kind, %summary, "trigger completed");
            (TriggerOutcome::Success, summary)
        }
        Err(e) => {
            error!(trigger = %kind, error = %e, "trigger failed");
            (TriggerOutcome::Error, e.to_string())
        }
    };
    TriggerRunRecord {
        trigger: kind,
        started_at,
        finished_at,
        outcome,
        summary,
    }
}

fn push_history(history: &SharedHistory, record: TriggerRunRecord, limit: usize) {
    let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
    history.push_back(record);
    while history.len() > limit {
        history.pop_front();
    }
}
