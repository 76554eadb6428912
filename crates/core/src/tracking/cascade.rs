//! Aggregates touched by a mutation

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use worktrack_domain::TimeLog;

/// Timesheets and employees whose aggregates must be recomputed after a
/// mutation commits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeTargets {
    pub timesheet_ids: BTreeSet<String>,
    pub employee_ids: BTreeSet<String>,
}

impl CascadeTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timesheet and employee of `log`.
    pub fn for_log(log: &TimeLog) -> Self {
        let mut targets = Self::new();
        targets.add_log(log);
        targets
    }

    pub fn add_log(&mut self, log: &TimeLog) {
        if let Some(timesheet_id) = &log.timesheet_id {
            self.timesheet_ids.insert(timesheet_id.clone());
        }
        self.employee_ids.insert(log.employee_id.clone());
    }

    pub fn add_timesheet(&mut self, timesheet_id: impl Into<String>) {
        self.timesheet_ids.insert(timesheet_id.into());
    }

    pub fn add_employee(&mut self, employee_id: impl Into<String>) {
        self.employee_ids.insert(employee_id.into());
    }

    pub fn extend(&mut self, other: CascadeTargets) {
        self.timesheet_ids.extend(other.timesheet_ids);
        self.employee_ids.extend(other.employee_ids);
    }

    pub fn is_empty(&self) -> bool {
        self.timesheet_ids.is_empty() && self.employee_ids.is_empty()
    }
}

/// Value produced by a mutation, with the aggregates it left stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    pub targets: CascadeTargets,
}

impl<T> Mutation<T> {
    pub fn new(value: T, targets: CascadeTargets) -> Self {
        Self { value, targets }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Mutation<U> {
        Mutation { value: f(self.value), targets: self.targets }
    }
}
