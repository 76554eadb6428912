//! Conflict resolver
//!
//! Guarantees that no two stopped logs of one employee overlap. A new or
//! edited range wins: every existing log it overlaps is trimmed, split or
//! removed before the write lands. A running log is never carved up; it
//! claims everything from its start onward, so a manual range reaching
//! past that start is refused until the timer stops.

use chrono::{DateTime, Utc};
use tracing::info;
use worktrack_domain::{DeleteMode, Result, TimeLog, WorkTrackError};

use super::cascade::CascadeTargets;
use super::ports::{OverlapQuery, RunningLogFilter, TrackingStore};
use super::span_splitter::delete_span;

/// Stopped logs strictly overlapping the query range, ordered by start.
///
/// Ranges that only touch at an endpoint are not conflicts.
pub fn find_overlapping(store: &dyn TrackingStore, query: &OverlapQuery) -> Result<Vec<TimeLog>> {
    let mut logs: Vec<TimeLog> = store
        .find_overlapping_logs(query)?
        .into_iter()
        .filter(|log| !query.exclude_ids.contains(&log.id))
        .filter(|log| log.range().is_some_and(|range| range.overlaps(&query.range)))
        .collect();
    logs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
    Ok(logs)
}

/// Carve the query range out of every conflicting log.
pub fn resolve_conflicts(
    store: &mut dyn TrackingStore,
    query: &OverlapQuery,
    mode: DeleteMode,
    now: DateTime<Utc>,
) -> Result<CascadeTargets> {
    let conflicts = find_overlapping(store, query)?;
    let mut targets = CascadeTargets::new();
    if conflicts.is_empty() {
        return Ok(targets);
    }

    info!(
        employee_id = %query.employee_id,
        start = %query.range.start,
        end = %query.range.end,
        conflicts = conflicts.len(),
        "resolving overlapping time logs"
    );

    for log in &conflicts {
        let result = delete_span(store, log, None, query.range, mode, now)?;
        targets.extend(result.targets);
    }
    Ok(targets)
}

/// Fail with [`WorkTrackError::Conflict`] if the range ends after the start
/// of a log the employee still has running.
pub fn ensure_clear_of_running(store: &dyn TrackingStore, query: &OverlapQuery) -> Result<()> {
    let running = store.find_running_logs(&RunningLogFilter {
        tenant_id: query.tenant_id.clone(),
        organization_id: None,
        employee_id: Some(query.employee_id.clone()),
    })?;
    let blocking = running.iter().find(|log| {
        log.stopped_at.is_none()
            && !query.exclude_ids.contains(&log.id)
            && log.started_at < query.range.end
    });
    if let Some(log) = blocking {
        return Err(WorkTrackError::Conflict(format!(
            "time log {} is running since {}; stop it before adding time after its start",
            log.id, log.started_at
        )));
    }
    Ok(())
}

/// Fail with [`WorkTrackError::Conflict`] if anything still overlaps.
pub fn ensure_no_overlap(store: &dyn TrackingStore, query: &OverlapQuery) -> Result<()> {
    let remaining = find_overlapping(store, query)?;
    if let Some(first) = remaining.first() {
        return Err(WorkTrackError::Conflict(format!(
            "time log {} overlaps [{}, {}) for employee {}",
            first.id, query.range.start, query.range.end, query.employee_id
        )));
    }
    Ok(())
}
