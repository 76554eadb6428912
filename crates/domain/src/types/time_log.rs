//! Time logs: continuous recorded work intervals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::range::DateRange;
use crate::impl_domain_status_conversions;

/// How the interval was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    Tracked,
    Manual,
    Idle,
    Resumed,
}

impl_domain_status_conversions!(LogType {
    Tracked => "tracked",
    Manual => "manual",
    Idle => "idle",
    Resumed => "resumed",
});

/// Client that produced the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    #[default]
    Web,
    Desktop,
    Browser,
    Mobile,
}

impl_domain_status_conversions!(LogSource {
    Web => "web",
    Desktop => "desktop",
    Browser => "browser",
    Mobile => "mobile",
});

/// Persistence mode for deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Reversible: rows are stamped with `deleted_at`.
    #[default]
    Soft,
    /// Permanent: rows are removed.
    Hard,
}

impl DeleteMode {
    pub fn from_force(force_delete: bool) -> Self {
        if force_delete {
            Self::Hard
        } else {
            Self::Soft
        }
    }
}

/// A continuous interval of work for one employee.
///
/// Duration is never stored; use [`TimeLog::duration_secs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLog {
    pub id: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub timesheet_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub log_type: LogType,
    pub source: LogSource,
    pub is_billable: bool,
    pub is_running: bool,
    pub description: Option<String>,
    pub reason: Option<String>,
    pub version: Option<String>,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub contact_id: Option<String>,
    pub team_id: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TimeLog {
    /// Start a new log owned by `employee_id`.
    pub fn new(
        tenant_id: impl Into<String>,
        organization_id: impl Into<String>,
        employee_id: impl Into<String>,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            tenant_id: tenant_id.into(),
            organization_id: organization_id.into(),
            employee_id: employee_id.into(),
            timesheet_id: None,
            started_at,
            stopped_at: None,
            log_type: LogType::Tracked,
            source: LogSource::Web,
            is_billable: true,
            is_running: false,
            description: None,
            reason: None,
            version: None,
            project_id: None,
            task_id: None,
            contact_id: None,
            team_id: None,
            edited_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Seconds between start and stop; zero while running.
    pub fn duration_secs(&self) -> i64 {
        self.stopped_at.map_or(0, |stopped| (stopped - self.started_at).num_seconds().max(0))
    }

    /// Seconds elapsed so far, counting a running log up to `now`.
    pub fn duration_until(&self, now: DateTime<Utc>) -> i64 {
        let end = self.stopped_at.unwrap_or(now);
        (end - self.started_at).num_seconds().max(0)
    }

    /// Closed range of a stopped log.
    pub fn range(&self) -> Option<DateRange> {
        self.stopped_at.map(|end| DateRange { start: self.started_at, end })
    }

    /// Range of the log, treating a running log as ending at `now`.
    pub fn effective_range(&self, now: DateTime<Utc>) -> DateRange {
        let end = self.stopped_at.unwrap_or(now).max(self.started_at);
        DateRange { start: self.started_at, end }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Copy every attribute into a new record with a fresh id.
    pub fn sibling(&self, range_start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            started_at: range_start,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..self.clone()
        }
    }
}

/// Association between a log and a slot.
///
/// A slot may be shared by several logs while an edit is in flight; after a
/// merge exactly one link per slot is primary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeLogSlotLink {
    pub time_log_id: String,
    pub time_slot_id: String,
    pub is_primary: bool,
}
