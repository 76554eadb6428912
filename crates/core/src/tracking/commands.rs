//! Named engine commands and their synchronous execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use worktrack_domain::{
    DateRange, DeleteMode, Permission, RequestContext, Result, SlotUpload, TimeLog, TimeSlot,
    Timesheet, TrackingConfig,
};

use super::cascade::{CascadeTargets, Mutation};
use super::ports::{RunningLogFilter, TrackingStore};
use super::recalculation::{recalculate_employee_hours, recalculate_timesheet};
use super::service::{
    require_employee, IngestReport, ManualTimeInput, TimeLogChanges, TimeLogService,
};
use super::slot_merger::{merge_range, MergeRequest};
use super::span_splitter::SpanOutcome;
use super::sweep::{sweep_pending, SweepPolicy, SweepReport, SweepSettings};
use super::timer::{start_timer, stop_timer, TimerStartInput, TimerStopInput};

/// Every operation the engine accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum Command {
    TimeLogCreate(ManualTimeInput),
    TimeLogUpdate {
        id: String,
        changes: TimeLogChanges,
    },
    TimeLogDelete {
        ids: Vec<String>,
        #[serde(default)]
        force_delete: bool,
    },
    DeleteTimeSpan {
        time_log_id: String,
        span: DateRange,
        #[serde(default)]
        slot_id: Option<String>,
        #[serde(default)]
        force_delete: bool,
    },
    TimeSlotMerge {
        #[serde(default)]
        organization_id: Option<String>,
        #[serde(default)]
        employee_id: Option<String>,
        range: DateRange,
        #[serde(default)]
        force_delete: bool,
    },
    TimeSlotIngest {
        #[serde(default)]
        employee_id: Option<String>,
        slots: Vec<SlotUpload>,
    },
    TimesheetRecalculate {
        timesheet_id: String,
    },
    EmployeeHoursRecalculate {
        employee_id: String,
    },
    ScheduleTimeLogEntries {
        #[serde(default)]
        organization_id: Option<String>,
        #[serde(default)]
        employee_id: Option<String>,
    },
    TimerStart(TimerStartInput),
    TimerStop(TimerStopInput),
}

impl Command {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TimeLogCreate(_) => "TimeLogCreate",
            Self::TimeLogUpdate { .. } => "TimeLogUpdate",
            Self::TimeLogDelete { .. } => "TimeLogDelete",
            Self::DeleteTimeSpan { .. } => "DeleteTimeSpan",
            Self::TimeSlotMerge { .. } => "TimeSlotMerge",
            Self::TimeSlotIngest { .. } => "TimeSlotIngest",
            Self::TimesheetRecalculate { .. } => "TimesheetRecalculate",
            Self::EmployeeHoursRecalculate { .. } => "EmployeeHoursRecalculate",
            Self::ScheduleTimeLogEntries { .. } => "ScheduleTimeLogEntries",
            Self::TimerStart(_) => "TimerStart",
            Self::TimerStop(_) => "TimerStop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CommandOutput {
    TimeLog(TimeLog),
    TimeLogs(Vec<TimeLog>),
    Deleted(usize),
    Span(SpanOutcome),
    Slots(Vec<TimeSlot>),
    Ingested(IngestReport),
    Timesheet(Option<Timesheet>),
    EmployeeHours(i64),
    Swept(SweepReport),
}

/// Executes commands against one transaction.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    service: TimeLogService,
    tracking: TrackingConfig,
    sweep: SweepSettings,
}

impl Engine {
    pub fn new(tracking: TrackingConfig, sweep: SweepSettings) -> Self {
        Self { service: TimeLogService::new(tracking.clone()), tracking, sweep }
    }

    pub fn tracking(&self) -> &TrackingConfig {
        &self.tracking
    }

    pub fn sweep_settings(&self) -> &SweepSettings {
        &self.sweep
    }

    /// Run `command` and report which aggregates it left stale.
    ///
    /// Recalculation commands write their aggregate directly and never
    /// report further targets.
    pub fn execute(
        &self,
        store: &mut dyn TrackingStore,
        ctx: &RequestContext,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Mutation<CommandOutput>> {
        match command {
            Command::TimeLogCreate(input) => Ok(self
                .service
                .add_manual_time(store, ctx, input, now)?
                .map(CommandOutput::TimeLog)),
            Command::TimeLogUpdate { id, changes } => Ok(self
                .service
                .update_manual_time(store, ctx, id, changes, now)?
                .map(CommandOutput::TimeLog)),
            Command::TimeLogDelete { ids, force_delete } => Ok(self
                .service
                .delete_time_logs(store, ctx, ids, DeleteMode::from_force(*force_delete), now)?
                .map(CommandOutput::Deleted)),
            Command::DeleteTimeSpan { time_log_id, span, slot_id, force_delete } => Ok(self
                .service
                .delete_time_span(
                    store,
                    ctx,
                    time_log_id,
                    *span,
                    slot_id.as_deref(),
                    DeleteMode::from_force(*force_delete),
                    now,
                )?
                .map(CommandOutput::Span)),
            Command::TimeSlotMerge { organization_id, employee_id, range, force_delete } => {
                let tenant_id = ctx.current_tenant_id()?;
                let employee_id = ctx.resolve_employee(employee_id.as_deref())?;
                let organization_id =
                    match organization_id.as_ref().or(ctx.organization_id.as_ref()) {
                        Some(id) => id.clone(),
                        None => require_employee(store, tenant_id, employee_id)?.organization_id,
                    };
                let request = MergeRequest {
                    tenant_id: tenant_id.to_string(),
                    organization_id,
                    employee_id: employee_id.to_string(),
                    range: *range,
                    mode: DeleteMode::from_force(*force_delete),
                };
                let outcome = merge_range(store, &request, now)?;
                Ok(Mutation::new(CommandOutput::Slots(outcome.slots), outcome.targets))
            }
            Command::TimeSlotIngest { employee_id, slots } => Ok(self
                .service
                .ingest_slots(store, ctx, employee_id.as_deref(), slots, now)?
                .map(CommandOutput::Ingested)),
            Command::TimesheetRecalculate { timesheet_id } => {
                let tenant_id = ctx.current_tenant_id()?;
                let timesheet = recalculate_timesheet(store, tenant_id, timesheet_id, now)?;
                Ok(Mutation::new(CommandOutput::Timesheet(timesheet), CascadeTargets::new()))
            }
            Command::EmployeeHoursRecalculate { employee_id } => {
                let tenant_id = ctx.current_tenant_id()?;
                let hours = recalculate_employee_hours(store, tenant_id, employee_id)?;
                Ok(Mutation::new(CommandOutput::EmployeeHours(hours), CascadeTargets::new()))
            }
            Command::ScheduleTimeLogEntries { organization_id, employee_id } => {
                let filter = RunningLogFilter {
                    tenant_id: ctx.current_tenant_id()?.to_string(),
                    organization_id: organization_id.clone(),
                    employee_id: sweep_scope(ctx, employee_id.as_deref())?,
                };
                let mut report =
                    sweep_pending(store, &filter, now, &self.sweep, SweepPolicy::StaleOnly)?;
                let targets = std::mem::take(&mut report.targets);
                Ok(Mutation::new(CommandOutput::Swept(report), targets))
            }
            Command::TimerStart(input) => {
                Ok(start_timer(store, ctx, input, &self.tracking, &self.sweep, now)?
                    .map(CommandOutput::TimeLog))
            }
            Command::TimerStop(input) => {
                Ok(stop_timer(store, ctx, input, &self.tracking, &self.sweep, now)?
                    .map(CommandOutput::TimeLogs))
            }
        }
    }
}

/// Employees a sweep may touch: anyone for privileged callers, otherwise
/// only the caller.
fn sweep_scope(ctx: &RequestContext, requested: Option<&str>) -> Result<Option<String>> {
    match requested {
        Some(id) => Ok(Some(ctx.resolve_employee(Some(id))?.to_string())),
        None if ctx.has_permission(Permission::ChangeSelectedEmployee) => Ok(None),
        None => Ok(Some(ctx.current_employee_id()?.to_string())),
    }
}
