//! End-to-end engine coverage against the SQLite adapter.
//!
//! Every test dispatches real commands through the bus onto an encrypted
//! database file with migrations applied, so the SQL behind each store
//! method is exercised the way the daemon uses it.

mod support;

use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use support::{at, at_secs, ctx, manual, SqliteHarness, EMPLOYEE, ORG, TENANT};
use worktrack_core::tracking::{IngestReport, SpanOutcome};
use worktrack_core::{Command, CommandOutput};
use worktrack_domain::{DateRange, SlotUpload, TimeLog, TimeSlotMinute, WorkTrackError};

#[tokio::test(flavor = "multi_thread")]
async fn manual_entry_persists_log_slots_and_aggregates() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    let log = harness.add_manual(at(9, 0), at(11, 30)).await;

    let logs = harness.stopped_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, log.id);

    let slots = harness.slots();
    assert_eq!(slots.len(), 15);
    assert!(slots.iter().all(|detail| detail.slot.duration == 600));
    assert!(slots.iter().all(|detail| detail.time_log_ids == vec![log.id.clone()]));

    let timesheet = harness.timesheet(log.timesheet_id.as_deref().unwrap());
    assert_eq!(timesheet.duration, 9_000);
    assert_eq!(harness.total_hours(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_entry_trims_and_splits_existing_log() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    let original = harness.add_manual(at(10, 0), at(11, 0)).await;
    let inserted = harness.add_manual(at(10, 20), at(10, 40)).await;

    let ranges: Vec<_> =
        harness.stopped_logs().iter().map(|log| (log.started_at, log.stopped_at)).collect();
    assert_eq!(
        ranges,
        vec![
            (at(10, 0), Some(at(10, 20))),
            (at(10, 20), Some(at(10, 40))),
            (at(10, 40), Some(at(11, 0))),
        ]
    );
    assert_eq!(harness.stopped_logs()[1].id, inserted.id);

    let timesheet = harness.timesheet(original.timesheet_id.as_deref().unwrap());
    assert_eq!(timesheet.duration, 3_600);
    assert_eq!(harness.total_hours(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_an_inner_span_splits_the_log() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    let log = harness.add_manual(at(10, 0), at(10, 25)).await;

    let output = harness
        .run(Command::DeleteTimeSpan {
            time_log_id: log.id.clone(),
            span: DateRange { start: at(10, 10), end: at(10, 15) },
            slot_id: None,
            force_delete: false,
        })
        .await;
    let CommandOutput::Span(SpanOutcome::Split { sibling_id }) = output else {
        panic!("expected a split, got {output:?}");
    };

    let logs = harness.stopped_logs();
    assert_eq!(logs.len(), 2);
    assert_eq!((logs[0].id.as_str(), logs[0].stopped_at), (log.id.as_str(), Some(at(10, 10))));
    assert_eq!((logs[1].id.as_str(), logs[1].started_at), (sibling_id.as_str(), at(10, 15)));

    let summary: Vec<_> =
        harness.slots().iter().map(|detail| (detail.slot.started_at, detail.slot.duration)).collect();
    assert_eq!(summary, vec![(at(10, 0), 600), (at(10, 10), 300), (at(10, 20), 300)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn uploads_merge_into_canonical_slots_with_children() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    let log = harness.add_manual(at(11, 0), at(11, 30)).await;

    let upload = |start, keyboard: i64| SlotUpload {
        started_at: start,
        duration: 300,
        keyboard,
        mouse: 10,
        overall: 100,
        time_log_ids: Vec::new(),
        screenshots: Vec::new(),
        activities: Vec::new(),
        minutes: vec![TimeSlotMinute {
            id: format!("minute-{keyboard}"),
            time_slot_id: None,
            keyboard,
            mouse: 10,
            recorded_at: start,
        }],
    };
    let slots = vec![upload(at_secs(11, 2, 10), 40), upload(at_secs(11, 7, 45), 60)];

    let output = harness.run(Command::TimeSlotIngest { employee_id: None, slots }).await;
    let CommandOutput::Ingested(IngestReport { inserted, linked, merged }) = output else {
        panic!("expected an ingest report, got {output:?}");
    };
    assert_eq!((inserted, linked), (2, 2));
    assert_eq!(merged, 1);

    let live = harness.slots();
    assert_eq!(live.len(), 3);
    let first = &live[0];
    assert_eq!(first.slot.started_at, at(11, 0));
    assert_eq!(first.minutes.len(), 2);
    assert_eq!(first.time_log_ids, vec![log.id.clone()]);

    // Merged-away duplicates are soft-deleted, not removed.
    assert_eq!(
        harness.count_rows("SELECT COUNT(*) FROM time_slots WHERE deleted_at IS NOT NULL"),
        3
    );
    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_slot_minutes"), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn sweep_closes_abandoned_timer() {
    let harness = SqliteHarness::new(at(9, 0)).await;
    let mut running = TimeLog::new(TENANT, ORG, EMPLOYEE, at(9, 0), at(9, 0));
    running.is_running = true;
    harness.with_store(|store| store.insert_time_log(&running)).unwrap();

    harness.clock.set(at(10, 0));
    let summary = harness.bus.sweep_all().await.expect("sweep should succeed");
    assert_eq!((summary.tenants, summary.closed, summary.failed), (1, 1, 0));

    let log = harness
        .with_store(|store| store.find_time_log(TENANT, &running.id))
        .unwrap()
        .expect("log should survive the sweep");
    assert!(!log.is_running);
    assert_eq!(log.stopped_at, Some(at(9, 0) + Duration::seconds(10)));
}

#[tokio::test(flavor = "multi_thread")]
async fn timer_round_trip_cascades_into_timesheet() {
    let harness = SqliteHarness::new(at(9, 0)).await;
    let started = harness.run(Command::TimerStart(Default::default())).await;
    let CommandOutput::TimeLog(log) = started else {
        panic!("expected a running log, got {started:?}");
    };
    assert!(log.is_running);

    harness.clock.set(at(9, 25));
    let stopped = harness.run(Command::TimerStop(Default::default())).await;
    let CommandOutput::TimeLogs(logs) = stopped else {
        panic!("expected stopped logs, got {stopped:?}");
    };
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].stopped_at, Some(at(9, 25)));

    let timesheet = harness.timesheet(logs[0].timesheet_id.as_deref().unwrap());
    assert_eq!(timesheet.duration, 1_500);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_commands_leave_the_database_untouched() {
    let harness = SqliteHarness::new(at(18, 0)).await;

    let reversed = harness
        .bus
        .dispatch(ctx(), Command::TimeLogCreate(manual(at(11, 0), at(10, 0))))
        .await
        .unwrap_err();
    assert!(matches!(reversed, WorkTrackError::InvalidInput(_)));

    let future = harness
        .bus
        .dispatch(ctx(), Command::TimeLogCreate(manual(at(19, 0), at(20, 0))))
        .await
        .unwrap_err();
    assert!(future.is_client_error());

    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_logs"), 0);
    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_slots"), 0);
    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM timesheets"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_delete_removes_rows_and_links() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    let log = harness.add_manual(at(9, 0), at(9, 30)).await;
    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_log_slots"), 3);

    let output =
        harness.run(Command::TimeLogDelete { ids: vec![log.id.clone()], force_delete: true }).await;
    assert_eq!(output, CommandOutput::Deleted(1));

    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_logs"), 0);
    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_log_slots"), 0);
    assert_eq!(harness.total_hours(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_share_one_timesheet() {
    let harness = Arc::new(SqliteHarness::new(at(18, 0)).await);

    let entries = (0..8u32).map(|hour| {
        let harness = Arc::clone(&harness);
        async move {
            harness
                .bus
                .dispatch(ctx(), Command::TimeLogCreate(manual(at(8 + hour, 0), at(8 + hour, 30))))
                .await
        }
    });
    let created: Vec<_> = join_all(entries).await.into_iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(created.len(), 8);

    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM timesheets"), 1);
    let logs = harness.stopped_logs();
    assert_eq!(logs.len(), 8);
    let timesheet = harness.timesheet(logs[0].timesheet_id.as_deref().unwrap());
    assert_eq!(timesheet.duration, 8 * 1_800);
    assert_eq!(harness.total_hours(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn sub_second_ranges_are_stored_as_returned() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    let millis = |ms| at(10, 0) + Duration::milliseconds(ms);

    let err = harness
        .bus
        .dispatch(ctx(), Command::TimeLogCreate(manual(millis(300), millis(800))))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkTrackError::InvalidInput(_)));
    assert_eq!(harness.count_rows("SELECT COUNT(*) FROM time_logs"), 0);

    let log = harness.add_manual(millis(300), millis(5_800)).await;
    let persisted = harness
        .with_store(|store| store.find_time_log(TENANT, &log.id))
        .unwrap()
        .expect("log should be persisted");
    assert_eq!((persisted.started_at, persisted.stopped_at), (log.started_at, log.stopped_at));
    assert_eq!((log.started_at, log.stopped_at), (at(10, 0), Some(at_secs(10, 0, 5))));
    assert_eq!(
        harness.count_rows("SELECT COUNT(*) FROM time_logs WHERE stopped_at <= started_at"),
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn running_timer_blocks_overlapping_manual_time() {
    let harness = SqliteHarness::new(at(9, 0)).await;
    harness.run(Command::TimerStart(Default::default())).await;

    harness.clock.set(at(9, 30));
    let err = harness
        .bus
        .dispatch(ctx(), Command::TimeLogCreate(manual(at(9, 10), at(9, 20))))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkTrackError::Conflict(_)));
    let earlier = harness.add_manual(at(8, 0), at(8, 30)).await;

    harness.clock.set(at(10, 0));
    harness.run(Command::TimerStop(Default::default())).await;

    let ranges: Vec<_> =
        harness.stopped_logs().iter().map(|log| (log.started_at, log.stopped_at)).collect();
    assert_eq!(ranges, vec![(at(8, 0), Some(at(8, 30))), (at(9, 0), Some(at(10, 0)))]);
    assert_eq!(harness.stopped_logs()[0].id, earlier.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn span_split_across_the_week_boundary_moves_the_sibling_timesheet() {
    let harness = SqliteHarness::new(at(18, 0)).await;
    // Sunday 23:00 to Monday 01:00 crosses into a new ISO week.
    let log = harness.add_manual(at(0, 0) - Duration::hours(1), at(1, 0)).await;
    let sunday_sheet = log.timesheet_id.clone().expect("log should have a timesheet");

    let output = harness
        .run(Command::DeleteTimeSpan {
            time_log_id: log.id.clone(),
            span: DateRange { start: at(0, 0) - Duration::minutes(30), end: at(0, 30) },
            slot_id: None,
            force_delete: false,
        })
        .await;
    let CommandOutput::Span(SpanOutcome::Split { sibling_id }) = output else {
        panic!("expected a split, got {output:?}");
    };

    let load = |id: &str| {
        harness
            .with_store(|store| store.find_time_log(TENANT, id))
            .unwrap()
            .expect("log should exist")
    };
    let left = load(&log.id);
    let right = load(&sibling_id);
    assert_eq!(left.stopped_at, Some(at(0, 0) - Duration::minutes(30)));
    assert_eq!(left.timesheet_id.as_deref(), Some(sunday_sheet.as_str()));
    assert_eq!(right.started_at, at(0, 30));
    let monday_sheet = right.timesheet_id.expect("sibling should have a timesheet");
    assert_ne!(monday_sheet, sunday_sheet);

    assert_eq!(harness.timesheet(&sunday_sheet).duration, 1_800);
    assert_eq!(harness.timesheet(&monday_sheet).duration, 1_800);
}
