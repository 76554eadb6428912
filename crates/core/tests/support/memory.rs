//! In-memory `TrackingDatabase`
//!
//! Each transaction works on a copy of the state and swaps it in only when
//! the unit of work succeeds, so a failed command leaves nothing behind.
//! The state mutex is held for the whole transaction, which serialises
//! writers the same way `BEGIN IMMEDIATE` does for SQLite.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use worktrack_core::{OverlapQuery, RunningLogFilter, SlotQuery, TrackingDatabase, TrackingStore};
use worktrack_domain::{
    Activity, DateRange, DeleteMode, Employee, Result, Screenshot, SlotAggregate, TimeLog,
    TimeLogSlotLink, TimeSlot, TimeSlotDetail, TimeSlotMinute, Timesheet, WorkTrackError,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub employees: Vec<Employee>,
    pub time_logs: Vec<TimeLog>,
    pub time_slots: Vec<TimeSlot>,
    pub links: Vec<TimeLogSlotLink>,
    pub timesheets: Vec<Timesheet>,
    pub screenshots: Vec<Screenshot>,
    pub activities: Vec<Activity>,
    pub minutes: Vec<TimeSlotMinute>,
}

impl MemoryState {
    pub fn live_logs(&self) -> Vec<&TimeLog> {
        let mut logs: Vec<&TimeLog> =
            self.time_logs.iter().filter(|log| !log.is_deleted()).collect();
        logs.sort_by_key(|log| log.started_at);
        logs
    }

    pub fn live_slots(&self) -> Vec<&TimeSlot> {
        let mut slots: Vec<&TimeSlot> =
            self.time_slots.iter().filter(|slot| slot.deleted_at.is_none()).collect();
        slots.sort_by_key(|slot| slot.started_at);
        slots
    }

    pub fn owners_of(&self, slot_id: &str) -> Vec<&TimeLogSlotLink> {
        self.links
            .iter()
            .filter(|link| link.time_slot_id == slot_id && self.log_is_live(&link.time_log_id))
            .collect()
    }

    pub fn employee(&self, id: &str) -> Option<&Employee> {
        self.employees.iter().find(|employee| employee.id == id)
    }

    pub fn timesheet(&self, id: &str) -> Option<&Timesheet> {
        self.timesheets.iter().find(|timesheet| timesheet.id == id)
    }

    fn log_is_live(&self, id: &str) -> bool {
        self.time_logs.iter().any(|log| log.id == id && !log.is_deleted())
    }

    fn slot_matches(slot: &TimeSlot, query: &SlotQuery) -> bool {
        slot.deleted_at.is_none()
            && slot.tenant_id == query.tenant_id
            && slot.employee_id == query.employee_id
            && query.organization_id.as_ref().map_or(true, |org| &slot.organization_id == org)
            && slot.started_at >= query.range.start
            && slot.started_at < query.range.end
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
    fail_aggregate_writes: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().expect("state lock").clone()
    }

    pub fn seed_employee(&self, employee: Employee) {
        self.state.lock().expect("state lock").employees.push(employee);
    }

    pub fn edit<F: FnOnce(&mut MemoryState)>(&self, f: F) {
        f(&mut self.state.lock().expect("state lock"));
    }

    /// Make timesheet and employee aggregate writes fail.
    pub fn fail_aggregate_writes(&self, fail: bool) {
        self.fail_aggregate_writes.store(fail, Ordering::SeqCst);
    }
}

impl TrackingDatabase for MemoryDatabase {
    fn run_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TrackingStore) -> Result<()>,
    ) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| WorkTrackError::Database("state lock poisoned".into()))?;
        let mut working = guard.clone();
        let mut store = MemoryStore {
            state: &mut working,
            fail_aggregate_writes: self.fail_aggregate_writes.load(Ordering::SeqCst),
        };
        work(&mut store)?;
        *guard = working;
        Ok(())
    }
}

struct MemoryStore<'a> {
    state: &'a mut MemoryState,
    fail_aggregate_writes: bool,
}

impl MemoryStore<'_> {
    fn aggregate_guard(&self) -> Result<()> {
        if self.fail_aggregate_writes {
            return Err(WorkTrackError::Database("aggregate write refused".into()));
        }
        Ok(())
    }

    fn sorted_logs(&self, filter: impl Fn(&TimeLog) -> bool) -> Vec<TimeLog> {
        let mut logs: Vec<TimeLog> = self
            .state
            .time_logs
            .iter()
            .filter(|log| !log.is_deleted() && filter(log))
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.started_at);
        logs
    }
}

impl TrackingStore for MemoryStore<'_> {
    fn find_employee(&self, tenant_id: &str, employee_id: &str) -> Result<Option<Employee>> {
        Ok(self
            .state
            .employees
            .iter()
            .find(|employee| employee.tenant_id == tenant_id && employee.id == employee_id)
            .cloned())
    }

    fn update_employee_hours(
        &mut self,
        tenant_id: &str,
        employee_id: &str,
        hours: i64,
    ) -> Result<()> {
        self.aggregate_guard()?;
        if let Some(employee) = self
            .state
            .employees
            .iter_mut()
            .find(|employee| employee.tenant_id == tenant_id && employee.id == employee_id)
        {
            employee.total_work_hours = hours;
        }
        Ok(())
    }

    fn list_tenant_ids(&self) -> Result<Vec<String>> {
        let tenants: BTreeSet<String> = self
            .state
            .time_logs
            .iter()
            .filter(|log| !log.is_deleted())
            .map(|log| log.tenant_id.clone())
            .collect();
        Ok(tenants.into_iter().collect())
    }

    fn find_time_log(&self, tenant_id: &str, id: &str) -> Result<Option<TimeLog>> {
        Ok(self.sorted_logs(|log| log.tenant_id == tenant_id && log.id == id).into_iter().next())
    }

    fn find_time_logs(&self, tenant_id: &str, ids: &[String]) -> Result<Vec<TimeLog>> {
        Ok(self.sorted_logs(|log| log.tenant_id == tenant_id && ids.contains(&log.id)))
    }

    fn find_overlapping_logs(&self, query: &OverlapQuery) -> Result<Vec<TimeLog>> {
        Ok(self.sorted_logs(|log| {
            log.tenant_id == query.tenant_id
                && log.employee_id == query.employee_id
                && !query.exclude_ids.contains(&log.id)
                && log.range().is_some_and(|range| range.overlaps(&query.range))
        }))
    }

    fn find_running_logs(&self, filter: &RunningLogFilter) -> Result<Vec<TimeLog>> {
        Ok(self.sorted_logs(|log| {
            log.tenant_id == filter.tenant_id
                && filter.organization_id.as_ref().map_or(true, |org| &log.organization_id == org)
                && filter.employee_id.as_ref().map_or(true, |emp| &log.employee_id == emp)
                && (log.stopped_at.is_none() || log.is_running)
        }))
    }

    fn find_last_stopped_log(
        &self,
        tenant_id: &str,
        employee_id: &str,
        before: DateTime<Utc>,
        exclude_id: &str,
    ) -> Result<Option<TimeLog>> {
        Ok(self
            .sorted_logs(|log| {
                log.tenant_id == tenant_id
                    && log.employee_id == employee_id
                    && log.id != exclude_id
                    && log.stopped_at.is_some_and(|stopped| stopped <= before)
            })
            .into_iter()
            .max_by_key(|log| log.stopped_at))
    }

    fn sum_log_seconds(
        &self,
        tenant_id: &str,
        employee_id: &str,
        within: Option<DateRange>,
    ) -> Result<i64> {
        Ok(self
            .sorted_logs(|log| {
                log.tenant_id == tenant_id
                    && log.employee_id == employee_id
                    && log.stopped_at.is_some()
                    && within.map_or(true, |range| {
                        log.started_at >= range.start && log.started_at < range.end
                    })
            })
            .iter()
            .map(TimeLog::duration_secs)
            .sum())
    }

    fn insert_time_log(&mut self, log: &TimeLog) -> Result<()> {
        self.state.time_logs.push(log.clone());
        Ok(())
    }

    fn update_time_log(&mut self, log: &TimeLog) -> Result<()> {
        let existing = self
            .state
            .time_logs
            .iter_mut()
            .find(|existing| existing.id == log.id && !existing.is_deleted())
            .ok_or_else(|| WorkTrackError::NotFound(format!("time log {}", log.id)))?;
        *existing = log.clone();
        Ok(())
    }

    fn delete_time_logs(
        &mut self,
        tenant_id: &str,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let matches = |log: &TimeLog| {
            log.tenant_id == tenant_id && ids.contains(&log.id) && !log.is_deleted()
        };
        let count = self.state.time_logs.iter().filter(|log| matches(log)).count();
        match mode {
            DeleteMode::Soft => {
                for log in self.state.time_logs.iter_mut().filter(|log| matches(log)) {
                    log.deleted_at = Some(now);
                }
            }
            DeleteMode::Hard => {
                self.state.time_logs.retain(|log| !matches(log));
                self.state.links.retain(|link| !ids.contains(&link.time_log_id));
            }
        }
        Ok(count)
    }

    fn find_slots(&self, query: &SlotQuery) -> Result<Vec<TimeSlotDetail>> {
        let mut slots: Vec<&TimeSlot> = self
            .state
            .time_slots
            .iter()
            .filter(|slot| MemoryState::slot_matches(slot, query))
            .collect();
        slots.sort_by_key(|slot| slot.started_at);

        Ok(slots
            .into_iter()
            .map(|slot| TimeSlotDetail {
                slot: slot.clone(),
                screenshots: self
                    .state
                    .screenshots
                    .iter()
                    .filter(|s| s.time_slot_id.as_deref() == Some(slot.id.as_str()))
                    .filter(|s| s.deleted_at.is_none())
                    .cloned()
                    .collect(),
                activities: self
                    .state
                    .activities
                    .iter()
                    .filter(|a| a.time_slot_id.as_deref() == Some(slot.id.as_str()))
                    .filter(|a| a.deleted_at.is_none())
                    .cloned()
                    .collect(),
                minutes: self
                    .state
                    .minutes
                    .iter()
                    .filter(|m| m.time_slot_id.as_deref() == Some(slot.id.as_str()))
                    .cloned()
                    .collect(),
                time_log_ids: self
                    .state
                    .owners_of(&slot.id)
                    .into_iter()
                    .map(|link| link.time_log_id.clone())
                    .collect(),
            })
            .collect())
    }

    fn find_slots_for_log(&self, tenant_id: &str, time_log_id: &str) -> Result<Vec<TimeSlot>> {
        let slot_ids: Vec<&str> = self
            .state
            .links
            .iter()
            .filter(|link| link.time_log_id == time_log_id)
            .map(|link| link.time_slot_id.as_str())
            .collect();
        let mut slots: Vec<TimeSlot> = self
            .state
            .time_slots
            .iter()
            .filter(|slot| {
                slot.tenant_id == tenant_id
                    && slot.deleted_at.is_none()
                    && slot_ids.contains(&slot.id.as_str())
            })
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.started_at);
        Ok(slots)
    }

    fn find_slot_links(&self, slot_ids: &[String]) -> Result<Vec<TimeLogSlotLink>> {
        Ok(self
            .state
            .links
            .iter()
            .filter(|link| slot_ids.contains(&link.time_slot_id))
            .filter(|link| self.state.log_is_live(&link.time_log_id))
            .cloned()
            .collect())
    }

    fn aggregate_slots(&self, query: &SlotQuery) -> Result<SlotAggregate> {
        let slots: Vec<&TimeSlot> = self
            .state
            .time_slots
            .iter()
            .filter(|slot| MemoryState::slot_matches(slot, query))
            .collect();
        if slots.is_empty() {
            return Ok(SlotAggregate::default());
        }
        let count = slots.len() as f64;
        let average = |metric: fn(&TimeSlot) -> i64| {
            (slots.iter().map(|slot| metric(slot)).sum::<i64>() as f64 / count).round() as i64
        };
        Ok(SlotAggregate {
            duration: slots.iter().map(|slot| slot.duration).sum(),
            keyboard: average(|slot| slot.keyboard),
            mouse: average(|slot| slot.mouse),
            overall: average(|slot| slot.overall),
            slot_count: slots.len() as i64,
        })
    }

    fn insert_time_slot(&mut self, slot: &TimeSlot) -> Result<()> {
        self.state.time_slots.push(slot.clone());
        Ok(())
    }

    fn update_time_slot(&mut self, slot: &TimeSlot) -> Result<()> {
        let existing = self
            .state
            .time_slots
            .iter_mut()
            .find(|existing| existing.id == slot.id)
            .ok_or_else(|| WorkTrackError::NotFound(format!("time slot {}", slot.id)))?;
        *existing = slot.clone();
        Ok(())
    }

    fn delete_time_slots(
        &mut self,
        tenant_id: &str,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let matches = |slot: &TimeSlot| {
            slot.tenant_id == tenant_id && ids.contains(&slot.id) && slot.deleted_at.is_none()
        };
        let count = self.state.time_slots.iter().filter(|slot| matches(slot)).count();
        match mode {
            DeleteMode::Soft => {
                for slot in self.state.time_slots.iter_mut().filter(|slot| matches(slot)) {
                    slot.deleted_at = Some(now);
                }
            }
            DeleteMode::Hard => {
                self.state.time_slots.retain(|slot| !matches(slot));
                self.state.links.retain(|link| !ids.contains(&link.time_slot_id));
                self.state.minutes.retain(|m| {
                    m.time_slot_id.as_ref().map_or(true, |id| !ids.contains(id))
                });
                for screenshot in &mut self.state.screenshots {
                    if screenshot.time_slot_id.as_ref().is_some_and(|id| ids.contains(id)) {
                        screenshot.time_slot_id = None;
                    }
                }
                for activity in &mut self.state.activities {
                    if activity.time_slot_id.as_ref().is_some_and(|id| ids.contains(id)) {
                        activity.time_slot_id = None;
                    }
                }
            }
        }
        Ok(count)
    }

    fn link_slot(&mut self, link: &TimeLogSlotLink) -> Result<()> {
        let existing = self.state.links.iter_mut().find(|existing| {
            existing.time_log_id == link.time_log_id && existing.time_slot_id == link.time_slot_id
        });
        match existing {
            Some(existing) => existing.is_primary = link.is_primary,
            None => self.state.links.push(link.clone()),
        }
        Ok(())
    }

    fn unlink_slot(&mut self, time_log_id: &str, time_slot_id: &str) -> Result<()> {
        self.state
            .links
            .retain(|link| !(link.time_log_id == time_log_id && link.time_slot_id == time_slot_id));
        Ok(())
    }

    fn insert_slot_children(
        &mut self,
        time_slot_id: &str,
        screenshots: &[Screenshot],
        activities: &[Activity],
        minutes: &[TimeSlotMinute],
    ) -> Result<()> {
        let owner = Some(time_slot_id.to_string());
        self.state.screenshots.extend(
            screenshots.iter().cloned().map(|s| Screenshot { time_slot_id: owner.clone(), ..s }),
        );
        self.state.activities.extend(
            activities.iter().cloned().map(|a| Activity { time_slot_id: owner.clone(), ..a }),
        );
        self.state.minutes.extend(
            minutes.iter().cloned().map(|m| TimeSlotMinute { time_slot_id: owner.clone(), ..m }),
        );
        Ok(())
    }

    fn reparent_slot_children(
        &mut self,
        from_slot_ids: &[String],
        to_slot_id: &str,
    ) -> Result<()> {
        let moves = |current: &mut Option<String>| {
            if current.as_ref().is_some_and(|id| from_slot_ids.contains(id)) {
                *current = Some(to_slot_id.to_string());
            }
        };
        self.state.screenshots.iter_mut().for_each(|s| moves(&mut s.time_slot_id));
        self.state.activities.iter_mut().for_each(|a| moves(&mut a.time_slot_id));
        self.state.minutes.iter_mut().for_each(|m| moves(&mut m.time_slot_id));
        Ok(())
    }

    fn find_timesheet(&self, tenant_id: &str, id: &str) -> Result<Option<Timesheet>> {
        Ok(self
            .state
            .timesheets
            .iter()
            .find(|ts| ts.tenant_id == tenant_id && ts.id == id && ts.deleted_at.is_none())
            .cloned())
    }

    fn find_timesheet_for_week(
        &self,
        tenant_id: &str,
        employee_id: &str,
        week_start: DateTime<Utc>,
    ) -> Result<Option<Timesheet>> {
        Ok(self
            .state
            .timesheets
            .iter()
            .find(|ts| {
                ts.tenant_id == tenant_id
                    && ts.employee_id == employee_id
                    && ts.started_at == week_start
                    && ts.deleted_at.is_none()
            })
            .cloned())
    }

    fn insert_timesheet(&mut self, timesheet: &Timesheet) -> Result<()> {
        self.state.timesheets.push(timesheet.clone());
        Ok(())
    }

    fn update_timesheet_aggregate(
        &mut self,
        tenant_id: &str,
        id: &str,
        aggregate: &SlotAggregate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.aggregate_guard()?;
        if let Some(timesheet) =
            self.state.timesheets.iter_mut().find(|ts| ts.tenant_id == tenant_id && ts.id == id)
        {
            timesheet.duration = aggregate.duration;
            timesheet.keyboard = aggregate.keyboard;
            timesheet.mouse = aggregate.mouse;
            timesheet.overall = aggregate.overall;
            timesheet.updated_at = now;
        }
        Ok(())
    }
}
