//! Timer start and stop
//!
//! Starting a timer first closes whatever the employee left running.
//! Stopping one settles the stop time from the recorded slots and the
//! weekly limit, then cuts the log at local midnight when configured to.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use worktrack_domain::{
    iso_week_range, whole_seconds, DateRange, DeleteMode, Employee, LogSource, LogType,
    RequestContext, Result, TimeLog, TimeSlot, TrackingConfig, WeeklyLimitPolicy, WorkTrackError,
};

use super::cascade::{CascadeTargets, Mutation};
use super::conflicts::{ensure_no_overlap, resolve_conflicts};
use super::ports::{OverlapQuery, RunningLogFilter, TrackingStore};
use super::recalculation::timesheet_first_or_create;
use super::service::require_employee;
use super::slot_sync::{delete_log_with_slots, sync_log_slots};
use super::sweep::{sweep_pending, SweepPolicy, SweepSettings};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerStartInput {
    pub employee_id: Option<String>,
    pub organization_id: Option<String>,
    /// Defaults to now.
    pub started_at: Option<DateTime<Utc>>,
    pub log_type: Option<LogType>,
    pub source: Option<LogSource>,
    pub is_billable: Option<bool>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub contact_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerStopInput {
    pub employee_id: Option<String>,
    /// Defaults to now.
    pub stopped_at: Option<DateTime<Utc>>,
    /// IANA zone used for the midnight split.
    pub timezone: Option<String>,
}

/// Start a running log, closing any log the employee left running.
#[instrument(skip_all)]
pub fn start_timer(
    store: &mut dyn TrackingStore,
    ctx: &RequestContext,
    input: &TimerStartInput,
    tracking: &TrackingConfig,
    settings: &SweepSettings,
    now: DateTime<Utc>,
) -> Result<Mutation<TimeLog>> {
    let tenant_id = ctx.current_tenant_id()?;
    let employee_id = ctx.resolve_employee(input.employee_id.as_deref())?;
    let employee = require_employee(store, tenant_id, employee_id)?;

    let started_at = whole_seconds(input.started_at.unwrap_or(now));
    if started_at > now && !(employee.future_date_allowed || tracking.allow_future_dates) {
        return Err(WorkTrackError::InvalidInput(format!(
            "timer may not start in the future ({started_at} > {now})"
        )));
    }

    let filter = RunningLogFilter {
        tenant_id: tenant_id.to_string(),
        organization_id: None,
        employee_id: Some(employee_id.to_string()),
    };
    let swept = sweep_pending(store, &filter, now, settings, SweepPolicy::Force)?;
    let mut targets = swept.targets;

    let organization_id = input
        .organization_id
        .clone()
        .or_else(|| ctx.organization_id.clone())
        .unwrap_or_else(|| employee.organization_id.clone());
    let timesheet =
        timesheet_first_or_create(store, tenant_id, &organization_id, employee_id, started_at, now)?;

    let mut log = TimeLog::new(tenant_id, organization_id, employee_id, started_at, now);
    log.is_running = true;
    log.timesheet_id = Some(timesheet.id);
    log.log_type = input.log_type.unwrap_or(LogType::Tracked);
    log.source = input.source.unwrap_or_default();
    log.is_billable = input.is_billable.unwrap_or(true);
    log.description = input.description.clone();
    log.version = input.version.clone();
    log.project_id = input.project_id.clone();
    log.task_id = input.task_id.clone();
    log.contact_id = input.contact_id.clone();
    log.team_id = input.team_id.clone();
    store.insert_time_log(&log)?;

    targets.add_log(&log);
    info!(time_log_id = %log.id, employee_id, closed = swept.closed, "timer started");
    Ok(Mutation::new(log, targets))
}

/// Stop the employee's running log.
///
/// Returns the resulting logs: one normally, several when the interval
/// was cut at midnight, none when nothing was left to keep.
#[instrument(skip_all)]
pub fn stop_timer(
    store: &mut dyn TrackingStore,
    ctx: &RequestContext,
    input: &TimerStopInput,
    tracking: &TrackingConfig,
    settings: &SweepSettings,
    now: DateTime<Utc>,
) -> Result<Mutation<Vec<TimeLog>>> {
    let tenant_id = ctx.current_tenant_id()?;
    let employee_id = ctx.resolve_employee(input.employee_id.as_deref())?;
    let employee = require_employee(store, tenant_id, employee_id)?;

    let running = store
        .find_running_logs(&RunningLogFilter {
            tenant_id: tenant_id.to_string(),
            organization_id: None,
            employee_id: Some(employee_id.to_string()),
        })?
        .into_iter()
        .filter(|log| log.stopped_at.is_none())
        .max_by_key(|log| log.started_at)
        .ok_or_else(|| WorkTrackError::NotFound(format!("running timer for {employee_id}")))?;

    let mut targets = CascadeTargets::for_log(&running);
    let requested = whole_seconds(input.stopped_at.unwrap_or(now)).max(running.started_at);

    let mut slots = store.find_slots_for_log(tenant_id, &running.id)?;
    slots.sort_by_key(|slot| slot.started_at);
    let mut stopped_at = if running.source == LogSource::Desktop {
        desktop_stopped_at(&running, &slots, requested, now, settings)
    } else {
        requested
    };

    if let Some(limit) = employee.weekly_limit_secs() {
        stopped_at = clamp_to_weekly_limit(
            store,
            &employee,
            &running,
            stopped_at,
            limit,
            tracking.weekly_limit_policy,
        )?;
    }

    if stopped_at <= running.started_at {
        warn!(time_log_id = %running.id, "timer stopped without duration, deleting");
        targets.extend(delete_log_with_slots(store, &running, DeleteMode::Soft, now)?);
        return Ok(Mutation::new(Vec::new(), targets));
    }

    let range = DateRange { start: running.started_at, end: stopped_at };
    let mut query = OverlapQuery {
        tenant_id: tenant_id.to_string(),
        employee_id: employee_id.to_string(),
        range,
        exclude_ids: vec![running.id.clone()],
    };
    targets.extend(resolve_conflicts(store, &query, DeleteMode::Soft, now)?);

    let cuts = if tracking.split_at_midnight {
        let tz = resolve_timezone(input.timezone.as_deref(), &employee, tracking)?;
        local_midnights(range, tz)
    } else {
        Vec::new()
    };

    let mut first = running.clone();
    first.stopped_at = Some(cuts.first().copied().unwrap_or(stopped_at));
    first.is_running = false;
    first.updated_at = now;
    store.update_time_log(&first)?;

    let mut parts = vec![first];
    for (index, cut) in cuts.iter().enumerate() {
        let mut part = running.sibling(*cut, now);
        part.stopped_at = Some(cuts.get(index + 1).copied().unwrap_or(stopped_at));
        part.is_running = false;
        let timesheet = timesheet_first_or_create(
            store,
            tenant_id,
            &part.organization_id,
            employee_id,
            *cut,
            now,
        )?;
        part.timesheet_id = Some(timesheet.id);
        store.insert_time_log(&part)?;
        parts.push(part);
    }

    // Later parts adopt their buckets before the first part lets go.
    for part in parts.iter().rev() {
        sync_log_slots(store, part, DeleteMode::Soft, now)?;
        targets.add_log(part);
    }

    query.exclude_ids = parts.iter().map(|part| part.id.clone()).collect();
    ensure_no_overlap(store, &query)?;

    info!(
        time_log_id = %running.id,
        employee_id,
        stopped_at = %stopped_at,
        parts = parts.len(),
        "timer stopped"
    );
    Ok(Mutation::new(parts, targets))
}

/// Stop time for a desktop log, trusting the device's slots over the
/// request when the agent fell silent.
pub fn desktop_stopped_at(
    log: &TimeLog,
    slots: &[TimeSlot],
    requested: DateTime<Utc>,
    now: DateTime<Utc>,
    settings: &SweepSettings,
) -> DateTime<Utc> {
    match slots.last() {
        Some(last) if requested - last.started_at > settings.stale_after => last.recorded_end(),
        None if now - log.started_at > settings.stale_after => {
            log.started_at + settings.abandoned_length
        }
        _ => requested,
    }
}

/// Pull `stopped_at` back so the week does not exceed `limit_secs`.
fn clamp_to_weekly_limit(
    store: &dyn TrackingStore,
    employee: &Employee,
    log: &TimeLog,
    stopped_at: DateTime<Utc>,
    limit_secs: i64,
    policy: WeeklyLimitPolicy,
) -> Result<DateTime<Utc>> {
    let week = iso_week_range(log.started_at);
    let used = store.sum_log_seconds(&log.tenant_id, &employee.id, Some(week))?;

    let anchor = match policy {
        WeeklyLimitPolicy::PreviousStop => store
            .find_last_stopped_log(&log.tenant_id, &employee.id, log.started_at, &log.id)?
            .and_then(|previous| previous.stopped_at)
            .unwrap_or(log.started_at),
        WeeklyLimitPolicy::CurrentStart => log.started_at,
    };

    Ok(weekly_limit_stop(anchor, stopped_at, limit_secs, used))
}

/// Latest stop the weekly limit permits, measured from `anchor`.
pub fn weekly_limit_stop(
    anchor: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
    limit_secs: i64,
    used_secs: i64,
) -> DateTime<Utc> {
    let remaining = Duration::seconds((limit_secs - used_secs).max(0));
    if stopped_at - anchor > remaining {
        anchor + remaining
    } else {
        stopped_at
    }
}

fn resolve_timezone(
    requested: Option<&str>,
    employee: &Employee,
    tracking: &TrackingConfig,
) -> Result<Tz> {
    if let Some(name) = requested {
        return name
            .parse::<Tz>()
            .map_err(|_| WorkTrackError::InvalidInput(format!("unknown timezone {name}")));
    }

    let name = employee.timezone.as_deref().unwrap_or(&tracking.default_timezone);
    Ok(name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = name, "unknown timezone, splitting at UTC midnight");
        Tz::UTC
    }))
}

/// Local midnights strictly inside `range`, as UTC instants.
pub fn local_midnights(range: DateRange, tz: Tz) -> Vec<DateTime<Utc>> {
    let mut cuts = Vec::new();
    let mut day = range.start.with_timezone(&tz).date_naive();

    while let Some(next) = day.succ_opt() {
        day = next;
        let Some(midnight) = tz.from_local_datetime(&next.and_time(NaiveTime::MIN)).earliest()
        else {
            continue;
        };
        let midnight = midnight.with_timezone(&Utc);
        if midnight >= range.end {
            break;
        }
        if midnight > range.start {
            cuts.push(midnight);
        }
    }
    cuts
}
