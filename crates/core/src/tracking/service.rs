//! Time log service - manual entries, deletions and device slot uploads

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use worktrack_domain::constants::SLOT_SECONDS;
use worktrack_domain::{
    whole_seconds, DateRange, DeleteMode, Employee, LogSource, LogType, Permission,
    RequestContext, Result, SlotUpload, TimeLog, TimeLogSlotLink, TimeSlot, TrackingConfig,
    WorkTrackError,
};

use super::cascade::{CascadeTargets, Mutation};
use super::conflicts::{ensure_clear_of_running, ensure_no_overlap, resolve_conflicts};
use super::ports::{OverlapQuery, RunningLogFilter, TrackingStore};
use super::recalculation::timesheet_first_or_create;
use super::slot_merger::{merge_range, MergeRequest};
use super::slot_sync::{delete_log_with_slots, sync_log_slots};
use super::span_splitter::{delete_span, SpanOutcome};

/// A manually entered interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTimeInput {
    /// Honoured only for callers allowed to act on other employees.
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    #[serde(default)]
    pub log_type: Option<LogType>,
    #[serde(default)]
    pub source: Option<LogSource>,
    #[serde(default)]
    pub is_billable: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

/// Fields of an existing log to overwrite. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeLogChanges {
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub is_billable: Option<bool>,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub contact_id: Option<String>,
    pub team_id: Option<String>,
}

impl TimeLogChanges {
    fn moves_range(&self) -> bool {
        self.started_at.is_some() || self.stopped_at.is_some()
    }
}

/// Outcome of a bulk slot upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub linked: usize,
    /// Canonical slots produced by the follow-up merge.
    pub merged: usize,
}

/// Validate a manual range for `employee`.
///
/// Both ends are truncated to whole seconds first. The range must then be
/// non-empty, and may only end in the future when the employee or the
/// deployment allows it.
pub fn allow_date(
    started_at: DateTime<Utc>,
    stopped_at: DateTime<Utc>,
    employee: &Employee,
    allow_future_dates: bool,
    now: DateTime<Utc>,
) -> Result<DateRange> {
    let range = DateRange::non_empty(whole_seconds(started_at), whole_seconds(stopped_at))?;
    if range.end > now && !(employee.future_date_allowed || allow_future_dates) {
        return Err(WorkTrackError::InvalidInput(format!(
            "time log may not end in the future ({} > {now})",
            range.end
        )));
    }
    Ok(range)
}

/// Manual time entry, deletion and device upload.
///
/// Every method runs inside the caller's transaction and returns the
/// aggregates it left stale; it never recalculates them itself.
#[derive(Debug, Clone, Default)]
pub struct TimeLogService {
    tracking: TrackingConfig,
}

impl TimeLogService {
    pub fn new(tracking: TrackingConfig) -> Self {
        Self { tracking }
    }

    /// Record a manual interval, carving it out of any log it overlaps.
    #[instrument(
        skip_all,
        fields(started_at = %input.started_at, stopped_at = %input.stopped_at)
    )]
    pub fn add_manual_time(
        &self,
        store: &mut dyn TrackingStore,
        ctx: &RequestContext,
        input: &ManualTimeInput,
        now: DateTime<Utc>,
    ) -> Result<Mutation<TimeLog>> {
        let tenant_id = ctx.current_tenant_id()?;
        let employee_id = ctx.resolve_employee(input.employee_id.as_deref())?;
        let employee = require_employee(store, tenant_id, employee_id)?;
        let range = allow_date(
            input.started_at,
            input.stopped_at,
            &employee,
            self.tracking.allow_future_dates,
            now,
        )?;

        let organization_id = input
            .organization_id
            .clone()
            .or_else(|| ctx.organization_id.clone())
            .unwrap_or_else(|| employee.organization_id.clone());

        let mut query = OverlapQuery {
            tenant_id: tenant_id.to_string(),
            employee_id: employee_id.to_string(),
            range,
            exclude_ids: Vec::new(),
        };
        ensure_clear_of_running(store, &query)?;
        let mut targets = resolve_conflicts(store, &query, DeleteMode::Soft, now)?;

        let timesheet = timesheet_first_or_create(
            store,
            tenant_id,
            &organization_id,
            employee_id,
            range.start,
            now,
        )?;

        let mut log = TimeLog::new(tenant_id, organization_id, employee_id, range.start, now);
        log.stopped_at = Some(range.end);
        log.timesheet_id = Some(timesheet.id);
        log.log_type = input.log_type.unwrap_or(LogType::Manual);
        log.source = input.source.unwrap_or_default();
        log.is_billable = input.is_billable.unwrap_or(true);
        log.description = input.description.clone();
        log.reason = input.reason.clone();
        log.project_id = input.project_id.clone();
        log.task_id = input.task_id.clone();
        log.contact_id = input.contact_id.clone();
        log.team_id = input.team_id.clone();

        store.insert_time_log(&log)?;
        sync_log_slots(store, &log, DeleteMode::Soft, now)?;

        query.exclude_ids.push(log.id.clone());
        ensure_no_overlap(store, &query)?;

        targets.add_log(&log);
        info!(
            time_log_id = %log.id,
            employee_id,
            duration = log.duration_secs(),
            "manual time added"
        );
        Ok(Mutation::new(log, targets))
    }

    /// Edit a stopped log. A moved range takes precedence over whatever it
    /// now overlaps.
    #[instrument(skip_all, fields(time_log_id = id))]
    pub fn update_manual_time(
        &self,
        store: &mut dyn TrackingStore,
        ctx: &RequestContext,
        id: &str,
        changes: &TimeLogChanges,
        now: DateTime<Utc>,
    ) -> Result<Mutation<TimeLog>> {
        let tenant_id = ctx.current_tenant_id()?;
        let existing = find_scoped_log(store, ctx, id)?;
        let mut targets = CascadeTargets::for_log(&existing);

        let mut log = existing.clone();
        if let Some(value) = changes.is_billable {
            log.is_billable = value;
        }
        for (field, value) in [
            (&mut log.description, &changes.description),
            (&mut log.reason, &changes.reason),
            (&mut log.project_id, &changes.project_id),
            (&mut log.task_id, &changes.task_id),
            (&mut log.contact_id, &changes.contact_id),
            (&mut log.team_id, &changes.team_id),
        ] {
            if value.is_some() {
                field.clone_from(value);
            }
        }
        log.updated_at = now;

        if !changes.moves_range() {
            store.update_time_log(&log)?;
            return Ok(Mutation::new(log, targets));
        }

        let started_at = changes.started_at.unwrap_or(existing.started_at);
        let Some(stopped_at) = changes.stopped_at.or(existing.stopped_at) else {
            return Err(WorkTrackError::InvalidInput(format!(
                "time log {id} is still running; stop it before editing its range"
            )));
        };

        let employee = require_employee(store, tenant_id, &existing.employee_id)?;
        let range =
            allow_date(started_at, stopped_at, &employee, self.tracking.allow_future_dates, now)?;

        let mut query = OverlapQuery {
            tenant_id: tenant_id.to_string(),
            employee_id: existing.employee_id.clone(),
            range,
            exclude_ids: vec![existing.id.clone()],
        };
        ensure_clear_of_running(store, &query)?;
        targets.extend(resolve_conflicts(store, &query, DeleteMode::Soft, now)?);

        let timesheet = timesheet_first_or_create(
            store,
            tenant_id,
            &existing.organization_id,
            &existing.employee_id,
            range.start,
            now,
        )?;
        log.started_at = range.start;
        log.stopped_at = Some(range.end);
        log.is_running = false;
        log.timesheet_id = Some(timesheet.id);
        log.edited_at = Some(now);

        store.update_time_log(&log)?;
        sync_log_slots(store, &log, DeleteMode::Soft, now)?;

        query.exclude_ids = vec![log.id.clone()];
        ensure_no_overlap(store, &query)?;

        targets.add_log(&log);
        info!(time_log_id = %log.id, start = %range.start, end = %range.end, "time log updated");
        Ok(Mutation::new(log, targets))
    }

    /// Delete logs by id together with the slots only they owned. Ids that
    /// do not resolve inside the caller's scope are skipped.
    #[instrument(skip_all, fields(count = ids.len(), mode = ?mode))]
    pub fn delete_time_logs(
        &self,
        store: &mut dyn TrackingStore,
        ctx: &RequestContext,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<Mutation<usize>> {
        let tenant_id = ctx.current_tenant_id()?;
        let mut targets = CascadeTargets::new();
        let mut deleted = 0;

        for log in store.find_time_logs(tenant_id, ids)? {
            if !in_scope(ctx, &log)? {
                debug!(time_log_id = %log.id, "skipping time log outside caller scope");
                continue;
            }
            targets.extend(delete_log_with_slots(store, &log, mode, now)?);
            deleted += 1;
        }

        info!(requested = ids.len(), deleted, ?mode, "time logs deleted");
        Ok(Mutation::new(deleted, targets))
    }

    /// Remove `span` from one log, optionally deleting `slot_id` when the
    /// span misses the log.
    #[instrument(
        skip_all,
        fields(time_log_id = time_log_id, span_start = %span.start, span_end = %span.end)
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn delete_time_span(
        &self,
        store: &mut dyn TrackingStore,
        ctx: &RequestContext,
        time_log_id: &str,
        span: DateRange,
        slot_id: Option<&str>,
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<Mutation<SpanOutcome>> {
        let span = DateRange::non_empty(whole_seconds(span.start), whole_seconds(span.end))?;
        let log = find_scoped_log(store, ctx, time_log_id)?;

        let slot = match slot_id {
            Some(slot_id) => store
                .find_slots_for_log(&log.tenant_id, &log.id)?
                .into_iter()
                .find(|slot| slot.id == slot_id),
            None => None,
        };

        let result = delete_span(store, &log, slot.as_ref(), span, mode, now)?;
        info!(time_log_id, outcome = ?result.outcome, "span removed from time log");
        Ok(Mutation::new(result.outcome, result.targets))
    }

    /// Store slots uploaded by a device agent, attach them to the logs
    /// covering their buckets, then fold duplicates in the touched range.
    #[instrument(skip_all, fields(uploads = uploads.len()))]
    pub fn ingest_slots(
        &self,
        store: &mut dyn TrackingStore,
        ctx: &RequestContext,
        employee_id: Option<&str>,
        uploads: &[SlotUpload],
        now: DateTime<Utc>,
    ) -> Result<Mutation<IngestReport>> {
        let tenant_id = ctx.current_tenant_id()?;
        let employee_id = ctx.resolve_employee(employee_id)?;
        let employee = require_employee(store, tenant_id, employee_id)?;
        let organization_id =
            ctx.organization_id.clone().unwrap_or_else(|| employee.organization_id.clone());

        let mut report = IngestReport::default();
        let mut targets = CascadeTargets::new();
        targets.add_employee(employee_id);

        let Some(covered) = upload_range(uploads) else {
            return Ok(Mutation::new(report, targets));
        };

        for upload in uploads {
            let mut slot =
                TimeSlot::empty(tenant_id, &organization_id, employee_id, upload.started_at, now);
            slot.duration = upload.duration;
            slot.keyboard = upload.keyboard;
            slot.mouse = upload.mouse;
            slot.overall = upload.overall;
            let slot = slot.normalized();
            store.insert_time_slot(&slot)?;
            report.inserted += 1;

            store.insert_slot_children(
                &slot.id,
                &upload.screenshots,
                &upload.activities,
                &upload.minutes,
            )?;

            let owners = upload_owners(store, tenant_id, employee_id, upload, &slot, now)?;
            for (index, owner) in owners.iter().enumerate() {
                store.link_slot(&TimeLogSlotLink {
                    time_log_id: owner.id.clone(),
                    time_slot_id: slot.id.clone(),
                    is_primary: index == 0,
                })?;
                report.linked += 1;
                targets.add_log(owner);
            }
        }

        let merged = merge_range(
            store,
            &MergeRequest {
                tenant_id: tenant_id.to_string(),
                organization_id,
                employee_id: employee_id.to_string(),
                range: covered,
                mode: DeleteMode::Soft,
            },
            now,
        )?;
        report.merged = merged.slots.len();
        targets.extend(merged.targets);

        info!(
            employee_id,
            inserted = report.inserted,
            linked = report.linked,
            merged = report.merged,
            "slots ingested"
        );
        Ok(Mutation::new(report, targets))
    }
}

/// Logs an uploaded slot belongs to: the ids the device named, else every
/// log of the employee overlapping the bucket.
fn upload_owners(
    store: &dyn TrackingStore,
    tenant_id: &str,
    employee_id: &str,
    upload: &SlotUpload,
    slot: &TimeSlot,
    now: DateTime<Utc>,
) -> Result<Vec<TimeLog>> {
    if !upload.time_log_ids.is_empty() {
        let logs = store.find_time_logs(tenant_id, &upload.time_log_ids)?;
        return Ok(logs.into_iter().filter(|log| log.employee_id == employee_id).collect());
    }

    let bucket = slot.bucket();
    let mut owners = store.find_overlapping_logs(&OverlapQuery {
        tenant_id: tenant_id.to_string(),
        employee_id: employee_id.to_string(),
        range: bucket,
        exclude_ids: Vec::new(),
    })?;
    let running = store.find_running_logs(&RunningLogFilter {
        tenant_id: tenant_id.to_string(),
        organization_id: None,
        employee_id: Some(employee_id.to_string()),
    })?;
    for log in running {
        if !owners.iter().any(|owner| owner.id == log.id) {
            owners.push(log);
        }
    }
    owners.retain(|log| log.effective_range(now).overlaps(&bucket));
    owners.sort_by_key(|log| log.started_at);
    Ok(owners)
}

/// Range from the earliest uploaded bucket to the end of the latest.
fn upload_range(uploads: &[SlotUpload]) -> Option<DateRange> {
    let start = uploads.iter().map(|upload| upload.started_at).min()?;
    let end = uploads.iter().map(|upload| upload.started_at).max()?;
    Some(DateRange { start, end: end + Duration::seconds(SLOT_SECONDS) })
}

pub(crate) fn require_employee(
    store: &dyn TrackingStore,
    tenant_id: &str,
    employee_id: &str,
) -> Result<Employee> {
    store
        .find_employee(tenant_id, employee_id)?
        .ok_or_else(|| WorkTrackError::NotFound(format!("employee {employee_id}")))
}

/// Whether the caller may touch `log`.
fn in_scope(ctx: &RequestContext, log: &TimeLog) -> Result<bool> {
    if ctx.has_permission(Permission::ChangeSelectedEmployee) {
        return Ok(true);
    }
    Ok(ctx.current_employee_id()? == log.employee_id)
}

/// Load a log the caller may touch; anything else reads as missing.
fn find_scoped_log(store: &dyn TrackingStore, ctx: &RequestContext, id: &str) -> Result<TimeLog> {
    let tenant_id = ctx.current_tenant_id()?;
    match store.find_time_log(tenant_id, id)? {
        Some(log) if in_scope(ctx, &log)? => Ok(log),
        _ => Err(WorkTrackError::NotFound(format!("time log {id}"))),
    }
}
