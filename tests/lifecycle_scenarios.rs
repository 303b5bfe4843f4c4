#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use common::{GatedGateway, Harness, MockGateway, at, awaiting, engine_over};
use taskwatch::channels::Answer;
use taskwatch::lifecycle::ArchiveOutcome;
use taskwatch::{DeliveryError, Task, TaskError, TaskStatus};

#[tokio::test(start_paused = true)]
async fn ready_task_is_dispatched_and_awaits_response() {
    let h = Harness::new(&[Task::new("T1", "Open the shop")]);
    let now = at(9, 0, 0);

    let report = h.engine.dispatch_ready_tasks_at(now).await.unwrap();
    assert_eq!(report.sent, vec!["T1".to_owned()]);

    let t1 = h.task("T1");
    assert_eq!(t1.status, TaskStatus::SentAwaitingResponse);
    assert_eq!(t1.response_time, taskwatch::time::format_timestamp(now));

    let sent = h.gateway.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Task-T1: yes"));
    assert_eq!(sent[0].options.ack_buttons.as_deref(), Some("T1"));
}

#[tokio::test(start_paused = true)]
async fn future_tasks_wait_for_their_time() {
    let h = Harness::new(&[Task::new("T1", "Close up").at("18:30")]);

    let report = h.engine.dispatch_ready_tasks_at(at(9, 0, 0)).await.unwrap();
    assert!(report.sent.is_empty());
    assert_eq!(h.task("T1").status, TaskStatus::Pending);

    let report = h.engine.dispatch_ready_tasks_at(at(18, 30, 0)).await.unwrap();
    assert_eq!(report.sent, vec!["T1".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn consecutive_sends_are_spaced_out() {
    let h = Harness::new(&[Task::new("T1", "a"), Task::new("T2", "b")]);

    h.engine.dispatch_ready_tasks_at(at(9, 0, 0)).await.unwrap();

    let sent = h.gateway.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].at - sent[0].at >= Duration::from_secs(2));
}

#[tokio::test]
async fn overdue_tasks_expire_with_one_batched_notice() {
    let now = at(12, 0, 0);
    let h = Harness::new(&[
        awaiting("T2", "Check fridge", now - chrono::Duration::minutes(61)),
        awaiting("T5", "Sign delivery", now - chrono::Duration::minutes(90)),
        awaiting("T6", "Still in time", now - chrono::Duration::minutes(30)),
    ]);

    let expired = h.engine.expire_overdue_at(now).await.unwrap();
    let ids: Vec<&str> = expired.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["T2", "T5"]);

    assert_eq!(h.task("T2").status, TaskStatus::Expired);
    assert_eq!(h.task("T6").status, TaskStatus::SentAwaitingResponse);

    let texts = h.gateway.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("T2"));
    assert!(texts[0].contains("T5"));
    assert!(!texts[0].contains("T6"));
}

#[tokio::test]
async fn expiry_needs_strictly_more_than_the_timeout() {
    let sent_at = at(9, 0, 0);
    let h = Harness::new(&[awaiting("T1", "a", sent_at)]);

    let expired = h.engine.expire_overdue_at(at(10, 0, 0)).await.unwrap();
    assert!(expired.is_empty());
    assert!(h.gateway.texts().is_empty());

    let expired = h.engine.expire_overdue_at(at(10, 0, 1)).await.unwrap();
    assert_eq!(expired.len(), 1);
}

#[tokio::test]
async fn follow_up_is_sent_once_inside_the_window() {
    let now = at(12, 0, 0);
    let h = Harness::new(&[awaiting("T3", "Water plants", now - chrono::Duration::minutes(25))]);

    let sent = h.engine.send_follow_ups_at(now).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].task_id, "T3");
    assert_eq!(sent[0].count, 1);
    assert_eq!(h.engine.follow_up_count("T3"), 1);

    let texts = h.gateway.texts();
    assert!(texts[0].contains("Reminder 1/2"));
    assert!(texts[0].contains("35 minutes left"));
    assert_eq!(h.task("T3").status, TaskStatus::SentAwaitingResponse);
}

#[tokio::test]
async fn follow_ups_stop_at_the_cap_and_at_the_timeout() {
    let sent_at = at(9, 0, 0);
    let h = Harness::new(&[awaiting("T3", "a", sent_at)]);

    assert!(h.engine.send_follow_ups_at(at(9, 10, 0)).await.unwrap().is_empty());
    assert_eq!(h.engine.send_follow_ups_at(at(9, 25, 0)).await.unwrap().len(), 1);
    assert_eq!(h.engine.send_follow_ups_at(at(9, 30, 0)).await.unwrap().len(), 1);
    assert!(h.engine.send_follow_ups_at(at(9, 35, 0)).await.unwrap().is_empty());
    assert_eq!(h.engine.follow_up_count("T3"), 2);
    assert_eq!(h.gateway.texts().len(), 2);

    let h = Harness::new(&[awaiting("T4", "b", sent_at)]);
    assert!(h.engine.send_follow_ups_at(at(10, 0, 0)).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_follow_up_does_not_use_up_a_slot() {
    let sent_at = at(9, 0, 0);
    let gateway = MockGateway::failing_with([DeliveryError::Failed("network down".to_owned())]);
    let h = Harness::with_gateway(&[awaiting("T3", "a", sent_at)], gateway);

    assert!(h.engine.send_follow_ups_at(at(9, 25, 0)).await.unwrap().is_empty());
    assert_eq!(h.engine.follow_up_count("T3"), 0);

    let sent = h.engine.send_follow_ups_at(at(9, 30, 0)).await.unwrap();
    assert_eq!(sent[0].count, 1);
}

#[tokio::test]
async fn follow_ups_skip_tasks_answered_mid_cycle() {
    let sent_at = at(9, 0, 0);
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(GatedGateway::new("T3"));
    let engine = Arc::new(engine_over(
        &dir,
        &[awaiting("T3", "Water plants", sent_at), awaiting("T4", "Lock door", sent_at)],
        gateway.clone(),
    ));

    let cycle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send_follow_ups_at(at(9, 25, 0)).await }
    });
    gateway.entered.notified().await;
    engine
        .record_response_at("T4", Answer::Yes, "alice", at(9, 25, 5))
        .await
        .unwrap();
    gateway.release.notify_one();

    let sent = cycle.await.unwrap().unwrap();
    let ids: Vec<&str> = sent.iter().map(|s| s.task_id.as_str()).collect();
    assert_eq!(ids, ["T3"]);
    assert_eq!(engine.follow_up_count("T4"), 0);
    assert_eq!(engine.follow_up_count("T3"), 1);

    let texts = gateway.inner.texts();
    assert_eq!(texts.len(), 1);
    assert!(!texts[0].contains("T4"));
}

#[tokio::test]
async fn follow_ups_skip_tasks_expired_mid_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(GatedGateway::new("T3"));
    let engine = Arc::new(engine_over(
        &dir,
        &[awaiting("T3", "a", at(9, 30, 0)), awaiting("T4", "b", at(8, 56, 0))],
        gateway.clone(),
    ));

    let cycle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send_follow_ups_at(at(9, 55, 0)).await }
    });
    gateway.entered.notified().await;
    let expired = engine.expire_overdue_at(at(9, 57, 0)).await.unwrap();
    assert_eq!(expired.len(), 1);
    gateway.release.notify_one();

    let sent = cycle.await.unwrap().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(engine.follow_up_count("T4"), 0);
}

#[tokio::test]
async fn answering_an_expired_task_changes_nothing() {
    let h = Harness::new(&[Task::new("T4", "Lock door").with_status(TaskStatus::Expired)]);
    let before = h.csv();

    let err = h
        .engine
        .record_response("T4", Answer::Yes, "alice")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TaskError::NotActionable {
            status: TaskStatus::Expired,
            ..
        }
    ));
    assert_eq!(h.csv(), before);
    assert!(h.gateway.edits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = Harness::new(&[Task::new("T1", "a")]);
    let err = h
        .engine
        .record_response("T9", Answer::No, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::NotFound(id) if id == "T9"));
}

#[tokio::test(start_paused = true)]
async fn answer_after_dispatch_edits_the_original_message() {
    let h = Harness::new(&[Task::new("T1", "Open the shop")]);
    h.engine.dispatch_ready_tasks_at(at(9, 0, 0)).await.unwrap();

    let updated = h
        .engine
        .record_response_at("T1", Answer::No, "carol", at(9, 10, 0))
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Failed);
    assert_eq!(updated.responded_by, "carol");

    let edits = h.gateway.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].0, 1);
    assert!(edits[0].1.contains("Not done"));
    assert!(h.engine.pending_snapshot_at(at(9, 10, 0)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn follow_up_replies_to_the_delivered_message() {
    let h = Harness::new(&[Task::new("T1", "a")]);
    h.engine.dispatch_ready_tasks_at(at(9, 0, 0)).await.unwrap();

    h.engine.send_follow_ups_at(at(9, 21, 0)).await.unwrap();
    let sent = h.gateway.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].options.reply_to, Some(1));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_task_pending_and_notify() {
    let failures = (0..3).map(|i| DeliveryError::Failed(format!("attempt {i}")));
    let h = Harness::with_gateway(&[Task::new("T1", "a")], MockGateway::failing_with(failures));
    let started = tokio::time::Instant::now();

    let report = h.engine.dispatch_ready_tasks_at(at(9, 0, 0)).await.unwrap();
    assert_eq!(report.failed, vec!["T1".to_owned()]);
    assert_eq!(h.task("T1").status, TaskStatus::Pending);
    assert!(started.elapsed() >= Duration::from_secs(10));

    assert_eq!(*h.gateway.attempts.lock().unwrap(), 4);
    let texts = h.gateway.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Could not deliver task"));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_for_the_suggested_delay() {
    let gateway = MockGateway::failing_with([DeliveryError::RateLimited {
        retry_after: Some(Duration::from_secs(12)),
    }]);
    let h = Harness::with_gateway(&[Task::new("T1", "a")], gateway);
    let started = tokio::time::Instant::now();

    let report = h.engine.dispatch_ready_tasks_at(at(9, 0, 0)).await.unwrap();
    assert_eq!(report.sent, vec!["T1".to_owned()]);
    assert!(started.elapsed() >= Duration::from_secs(12));
}

#[tokio::test]
async fn daily_reset_is_idempotent() {
    let now = at(23, 58, 0);
    let mut done = Task::new("T2", "b").with_status(TaskStatus::Completed);
    done.response_time = taskwatch::time::format_timestamp(now);
    done.responded_by = "alice".to_owned();
    let h = Harness::new(&[
        Task::new("T1", "a"),
        done,
        awaiting("T3", "c", now),
        Task::new("T4", "d").with_status(TaskStatus::Expired),
    ]);

    h.engine.daily_reset().await.unwrap();
    let once = h.csv();
    h.engine.daily_reset().await.unwrap();
    assert_eq!(h.csv(), once);

    for task in h.engine.store().load_all().unwrap() {
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.response_time.is_empty());
        assert!(task.responded_by.is_empty());
    }
    assert!(h.engine.pending_snapshot_at(now).is_empty());
}

#[tokio::test]
async fn archive_runs_once_per_day() {
    let h = Harness::new(&[Task::new("T1", "a")]);
    let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

    let first = h.engine.daily_archive_for(day).await.unwrap();
    let ArchiveOutcome::Archived { path, .. } = first else {
        panic!("expected a fresh archive, got {first:?}");
    };
    assert_eq!(std::fs::read_to_string(&path).unwrap(), h.csv());

    let second = h.engine.daily_archive_for(day).await.unwrap();
    assert_eq!(second, ArchiveOutcome::AlreadyArchived { date: day });
    assert_eq!(h.gateway.texts().len(), 1);
}
