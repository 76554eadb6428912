//! Weekly timesheets

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::range::DateRange;
use crate::impl_domain_status_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimesheetStatus {
    Draft,
    #[default]
    Pending,
    InReview,
    Approved,
    Denied,
}

impl_domain_status_conversions!(TimesheetStatus {
    Draft => "draft",
    Pending => "pending",
    InReview => "in-review",
    Approved => "approved",
    Denied => "denied",
});

/// Per-employee aggregate over one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timesheet {
    pub id: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub duration: i64,
    pub keyboard: i64,
    pub mouse: i64,
    pub overall: i64,
    pub status: TimesheetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Timesheet {
    /// Empty timesheet for the week containing `instant`.
    pub fn for_week_of(
        tenant_id: impl Into<String>,
        organization_id: impl Into<String>,
        employee_id: impl Into<String>,
        instant: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let week = iso_week_range(instant);
        Self {
            id: Uuid::now_v7().to_string(),
            tenant_id: tenant_id.into(),
            organization_id: organization_id.into(),
            employee_id: employee_id.into(),
            started_at: week.start,
            stopped_at: week.end,
            duration: 0,
            keyboard: 0,
            mouse: 0,
            overall: 0,
            status: TimesheetStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn week(&self) -> DateRange {
        DateRange { start: self.started_at, end: self.stopped_at }
    }
}

/// Aggregate written back by a timesheet recalculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAggregate {
    pub duration: i64,
    pub keyboard: i64,
    pub mouse: i64,
    pub overall: i64,
    pub slot_count: i64,
}

/// `[Monday 00:00, next Monday 00:00)` in UTC for the ISO week of `instant`.
pub fn iso_week_range(instant: DateTime<Utc>) -> DateRange {
    let days_from_monday = i64::from(instant.weekday().num_days_from_monday());
    let monday = instant.date_naive() - Duration::days(days_from_monday);
    let start = monday.and_time(NaiveTime::MIN).and_utc();
    DateRange { start, end: start + Duration::weeks(1) }
}
