//! Port interfaces for the interval engine
//!
//! These traits define the boundary between the engine and whatever store
//! persists time logs, slots and timesheets. A unit of work receives a
//! `&mut dyn TrackingStore` scoped to one transaction; everything it does
//! commits or rolls back together.

use chrono::{DateTime, Utc};
use worktrack_domain::{
    Activity, DateRange, DeleteMode, Employee, Result, Screenshot, SlotAggregate, TimeLog,
    TimeLogSlotLink, TimeSlot, TimeSlotDetail, TimeSlotMinute, Timesheet, WorkTrackError,
};

/// Stopped, live logs of one employee overlapping `range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapQuery {
    pub tenant_id: String,
    pub employee_id: String,
    pub range: DateRange,
    pub exclude_ids: Vec<String>,
}

/// Live logs still flagged as running or missing a stop time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningLogFilter {
    pub tenant_id: String,
    pub organization_id: Option<String>,
    pub employee_id: Option<String>,
}

/// Live slots of one employee whose start falls in `[range.start, range.end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub tenant_id: String,
    pub organization_id: Option<String>,
    pub employee_id: String,
    pub range: DateRange,
}

/// Transaction-scoped access to engine state.
///
/// Reads never return soft-deleted rows.
pub trait TrackingStore {
    // Employees

    fn find_employee(&self, tenant_id: &str, employee_id: &str) -> Result<Option<Employee>>;

    fn update_employee_hours(&mut self, tenant_id: &str, employee_id: &str, hours: i64)
        -> Result<()>;

    /// Tenants that own at least one time log.
    fn list_tenant_ids(&self) -> Result<Vec<String>>;

    // Time logs

    fn find_time_log(&self, tenant_id: &str, id: &str) -> Result<Option<TimeLog>>;

    fn find_time_logs(&self, tenant_id: &str, ids: &[String]) -> Result<Vec<TimeLog>>;

    /// Ordered by `started_at`. Running logs are not part of the result.
    fn find_overlapping_logs(&self, query: &OverlapQuery) -> Result<Vec<TimeLog>>;

    /// Ordered by `started_at`.
    fn find_running_logs(&self, filter: &RunningLogFilter) -> Result<Vec<TimeLog>>;

    /// Most recent stopped log ending at or before `before`.
    fn find_last_stopped_log(
        &self,
        tenant_id: &str,
        employee_id: &str,
        before: DateTime<Utc>,
        exclude_id: &str,
    ) -> Result<Option<TimeLog>>;

    /// Sum of `max(0, stopped_at - started_at)` over stopped logs, optionally
    /// limited to logs starting inside `within`.
    fn sum_log_seconds(
        &self,
        tenant_id: &str,
        employee_id: &str,
        within: Option<DateRange>,
    ) -> Result<i64>;

    fn insert_time_log(&mut self, log: &TimeLog) -> Result<()>;

    fn update_time_log(&mut self, log: &TimeLog) -> Result<()>;

    fn delete_time_logs(
        &mut self,
        tenant_id: &str,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<usize>;

    // Time slots

    /// Ordered by `started_at`, then creation order, with children and
    /// owning log ids loaded.
    fn find_slots(&self, query: &SlotQuery) -> Result<Vec<TimeSlotDetail>>;

    fn find_slots_for_log(&self, tenant_id: &str, time_log_id: &str) -> Result<Vec<TimeSlot>>;

    /// Links between the given slots and live logs.
    fn find_slot_links(&self, slot_ids: &[String]) -> Result<Vec<TimeLogSlotLink>>;

    /// Sum of durations and rounded averages of the activity metrics.
    fn aggregate_slots(&self, query: &SlotQuery) -> Result<SlotAggregate>;

    fn insert_time_slot(&mut self, slot: &TimeSlot) -> Result<()>;

    fn update_time_slot(&mut self, slot: &TimeSlot) -> Result<()>;

    fn delete_time_slots(
        &mut self,
        tenant_id: &str,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<usize>;

    /// Insert or replace the association.
    fn link_slot(&mut self, link: &TimeLogSlotLink) -> Result<()>;

    fn unlink_slot(&mut self, time_log_id: &str, time_slot_id: &str) -> Result<()>;

    fn insert_slot_children(
        &mut self,
        time_slot_id: &str,
        screenshots: &[Screenshot],
        activities: &[Activity],
        minutes: &[TimeSlotMinute],
    ) -> Result<()>;

    /// Move screenshots, activities and minute records onto `to_slot_id`.
    fn reparent_slot_children(&mut self, from_slot_ids: &[String], to_slot_id: &str)
        -> Result<()>;

    // Timesheets

    fn find_timesheet(&self, tenant_id: &str, id: &str) -> Result<Option<Timesheet>>;

    fn find_timesheet_for_week(
        &self,
        tenant_id: &str,
        employee_id: &str,
        week_start: DateTime<Utc>,
    ) -> Result<Option<Timesheet>>;

    fn insert_timesheet(&mut self, timesheet: &Timesheet) -> Result<()>;

    fn update_timesheet_aggregate(
        &mut self,
        tenant_id: &str,
        id: &str,
        aggregate: &SlotAggregate,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

/// Unit-of-work boundary.
///
/// Implementations open a transaction, hand the closure a store bound to it,
/// and commit only when the closure returns `Ok`. Writers must be
/// serialised so that a conflict check and the write it guards see the
/// same state.
pub trait TrackingDatabase: Send + Sync {
    fn run_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TrackingStore) -> Result<()>,
    ) -> Result<()>;
}

/// Run `work` in one transaction and return its output.
pub fn transact<T, F>(db: &dyn TrackingDatabase, mut work: F) -> Result<T>
where
    F: FnMut(&mut dyn TrackingStore) -> Result<T>,
{
    let mut output = None;
    db.run_in_transaction(&mut |store| {
        output = Some(work(store)?);
        Ok(())
    })?;
    output.ok_or_else(|| WorkTrackError::Internal("transaction completed without output".into()))
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
