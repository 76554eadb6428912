//! Recalculation cascade
//!
//! Recomputes the derived aggregates from the rows they summarise. Both
//! operations read current state and overwrite a single aggregate, so they
//! can be re-run at any time.

use chrono::{DateTime, Utc};
use tracing::debug;
use worktrack_domain::constants::SECONDS_PER_HOUR;
use worktrack_domain::{iso_week_range, Result, Timesheet};

use super::ports::{SlotQuery, TrackingStore};

/// Rewrite a timesheet's duration and activity averages from its week's
/// slots. Returns `None` when the timesheet no longer exists.
pub fn recalculate_timesheet(
    store: &mut dyn TrackingStore,
    tenant_id: &str,
    timesheet_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Timesheet>> {
    let Some(mut timesheet) = store.find_timesheet(tenant_id, timesheet_id)? else {
        debug!(tenant_id, timesheet_id, "timesheet missing, skipping recalculation");
        return Ok(None);
    };

    let query = SlotQuery {
        tenant_id: tenant_id.to_string(),
        organization_id: Some(timesheet.organization_id.clone()),
        employee_id: timesheet.employee_id.clone(),
        range: timesheet.week(),
    };
    let aggregate = store.aggregate_slots(&query)?;
    store.update_timesheet_aggregate(tenant_id, timesheet_id, &aggregate, now)?;

    timesheet.duration = aggregate.duration;
    timesheet.keyboard = aggregate.keyboard;
    timesheet.mouse = aggregate.mouse;
    timesheet.overall = aggregate.overall;
    timesheet.updated_at = now;

    debug!(
        timesheet_id,
        duration = aggregate.duration,
        slots = aggregate.slot_count,
        "timesheet recalculated"
    );
    Ok(Some(timesheet))
}

/// Rewrite `total_work_hours` as the floored sum of all stopped log
/// durations.
pub fn recalculate_employee_hours(
    store: &mut dyn TrackingStore,
    tenant_id: &str,
    employee_id: &str,
) -> Result<i64> {
    let seconds = store.sum_log_seconds(tenant_id, employee_id, None)?;
    let hours = seconds_to_hours(seconds);
    store.update_employee_hours(tenant_id, employee_id, hours)?;
    debug!(employee_id, seconds, hours, "employee hours recalculated");
    Ok(hours)
}

/// Whole hours, floored; negative totals count as zero.
pub fn seconds_to_hours(seconds: i64) -> i64 {
    seconds.max(0) / SECONDS_PER_HOUR
}

/// Timesheet for the ISO week containing `instant`, created on first use.
pub fn timesheet_first_or_create(
    store: &mut dyn TrackingStore,
    tenant_id: &str,
    organization_id: &str,
    employee_id: &str,
    instant: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Timesheet> {
    let week = iso_week_range(instant);
    if let Some(existing) = store.find_timesheet_for_week(tenant_id, employee_id, week.start)? {
        return Ok(existing);
    }

    let timesheet = Timesheet::for_week_of(tenant_id, organization_id, employee_id, instant, now);
    store.insert_timesheet(&timesheet)?;
    debug!(timesheet_id = %timesheet.id, employee_id, week_start = %week.start, "timesheet created");
    Ok(timesheet)
}
