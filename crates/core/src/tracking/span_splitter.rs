//! Span splitter
//!
//! Removes a sub-range from a single log. Depending on where the span falls
//! the log is deleted, trimmed at one end, or split into two logs that keep
//! every attribute of the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use worktrack_domain::{DateRange, DeleteMode, Result, TimeLog, TimeSlot};

use super::cascade::CascadeTargets;
use super::ports::TrackingStore;
use super::recalculation::timesheet_first_or_create;
use super::slot_sync::{delete_log_with_slots, sync_log_slots};

/// What removing a span does to a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SpanPlan {
    /// The span misses the log.
    Disjoint,
    /// Nothing of the log survives.
    DeleteLog,
    TrimStart { started_at: DateTime<Utc> },
    TrimEnd { stopped_at: DateTime<Utc> },
    /// The span lies strictly inside the log.
    Split { left_end: DateTime<Utc>, right_start: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SpanOutcome {
    Disjoint,
    Deleted,
    StartTrimmed,
    EndTrimmed,
    Split { sibling_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanResult {
    pub outcome: SpanOutcome,
    pub targets: CascadeTargets,
}

/// Decide how `span` affects `log`.
///
/// Membership of the log's endpoints is tested inclusively. A running log
/// is treated as ending at `now`, but its end never counts as inside the
/// span, so removing a span never deletes a running log outright unless
/// nothing of it would remain.
pub fn plan_span(log: &TimeLog, span: &DateRange, now: DateTime<Utc>) -> SpanPlan {
    let range = log.effective_range(now);
    if !range.overlaps(span) {
        return SpanPlan::Disjoint;
    }

    let start_in = span.contains(log.started_at);
    let stop_in = log.stopped_at.is_some_and(|stopped| span.contains(stopped));

    match (start_in, stop_in) {
        (true, true) => SpanPlan::DeleteLog,
        (true, false) => {
            if (range.end - span.end).num_seconds() <= 0 {
                SpanPlan::DeleteLog
            } else {
                SpanPlan::TrimStart { started_at: span.end }
            }
        }
        (false, true) => {
            if (span.start - log.started_at).num_seconds() <= 0 {
                SpanPlan::DeleteLog
            } else {
                SpanPlan::TrimEnd { stopped_at: span.start }
            }
        }
        (false, false) => SpanPlan::Split { left_end: span.start, right_start: span.end },
    }
}

/// Remove `span` from `log`.
///
/// When the span misses the log entirely, only `slot` (if given) is
/// deleted.
pub fn delete_span(
    store: &mut dyn TrackingStore,
    log: &TimeLog,
    slot: Option<&TimeSlot>,
    span: DateRange,
    mode: DeleteMode,
    now: DateTime<Utc>,
) -> Result<SpanResult> {
    let plan = plan_span(log, &span, now);
    debug!(time_log_id = %log.id, ?plan, "removing span from time log");

    let mut targets = CascadeTargets::for_log(log);
    let outcome = match plan {
        SpanPlan::Disjoint => {
            if let Some(slot) = slot {
                store.delete_time_slots(&log.tenant_id, std::slice::from_ref(&slot.id), mode, now)?;
            }
            SpanOutcome::Disjoint
        }
        SpanPlan::DeleteLog => {
            targets.extend(delete_log_with_slots(store, log, mode, now)?);
            SpanOutcome::Deleted
        }
        SpanPlan::TrimStart { started_at } => {
            let mut trimmed = edited(log, now);
            trimmed.started_at = started_at;
            assign_timesheet(store, &mut trimmed, now)?;
            store.update_time_log(&trimmed)?;
            sync_log_slots(store, &trimmed, mode, now)?;
            targets.add_log(&trimmed);
            SpanOutcome::StartTrimmed
        }
        SpanPlan::TrimEnd { stopped_at } => {
            let mut trimmed = edited(log, now);
            trimmed.stopped_at = Some(stopped_at);
            trimmed.is_running = false;
            store.update_time_log(&trimmed)?;
            sync_log_slots(store, &trimmed, mode, now)?;
            SpanOutcome::EndTrimmed
        }
        SpanPlan::Split { left_end, right_start } => {
            // The right half is created first so slots shared with the left
            // half always keep an owner.
            let mut sibling = log.sibling(right_start, now);
            sibling.edited_at = Some(now);
            assign_timesheet(store, &mut sibling, now)?;
            store.insert_time_log(&sibling)?;
            sync_log_slots(store, &sibling, mode, now)?;
            targets.add_log(&sibling);

            let mut left = edited(log, now);
            left.stopped_at = Some(left_end);
            left.is_running = false;
            store.update_time_log(&left)?;
            sync_log_slots(store, &left, mode, now)?;

            SpanOutcome::Split { sibling_id: sibling.id }
        }
    };

    Ok(SpanResult { outcome, targets })
}

fn edited(log: &TimeLog, now: DateTime<Utc>) -> TimeLog {
    let mut log = log.clone();
    log.edited_at = Some(now);
    log.updated_at = now;
    log
}

/// Point the log at the timesheet of the week it now starts in.
fn assign_timesheet(
    store: &mut dyn TrackingStore,
    log: &mut TimeLog,
    now: DateTime<Utc>,
) -> Result<()> {
    let timesheet = timesheet_first_or_create(
        store,
        &log.tenant_id,
        &log.organization_id,
        &log.employee_id,
        log.started_at,
        now,
    )?;
    log.timesheet_id = Some(timesheet.id);
    Ok(())
}
