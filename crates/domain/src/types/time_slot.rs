//! Time slots and the records hanging off them

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::range::{floor_to_slot, DateRange, SlotWindow};
use crate::constants::{MAX_SLOT_ACTIVITY, SLOT_SECONDS};

/// Clamp an activity metric into `[0, 600]`.
pub fn clamp_activity(value: i64) -> i64 {
    value.clamp(0, MAX_SLOT_ACTIVITY)
}

/// A 10-minute aggregation bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub employee_id: String,
    /// Always on a bucket boundary.
    pub started_at: DateTime<Utc>,
    pub duration: i64,
    pub keyboard: i64,
    pub mouse: i64,
    pub overall: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Activity ratios in percent, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityPercentages {
    pub keyboard: f64,
    pub mouse: f64,
    pub overall: f64,
}

impl TimeSlot {
    /// Empty bucket for `instant`, with its start floored to the boundary.
    pub fn empty(
        tenant_id: impl Into<String>,
        organization_id: impl Into<String>,
        employee_id: impl Into<String>,
        instant: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            tenant_id: tenant_id.into(),
            organization_id: organization_id.into(),
            employee_id: employee_id.into(),
            started_at: floor_to_slot(instant),
            duration: 0,
            keyboard: 0,
            mouse: 0,
            overall: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn window(&self) -> SlotWindow {
        SlotWindow::containing(self.started_at)
    }

    /// Bucket covered by the slot, `[started_at, started_at + 600s)`.
    pub fn bucket(&self) -> DateRange {
        DateRange {
            start: self.started_at,
            end: self.started_at + Duration::seconds(SLOT_SECONDS),
        }
    }

    /// End of the recorded time inside the bucket.
    pub fn recorded_end(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(self.duration.max(0))
    }

    /// Clamp every metric into the valid window.
    pub fn normalized(mut self) -> Self {
        self.duration = clamp_activity(self.duration);
        self.keyboard = clamp_activity(self.keyboard);
        self.mouse = clamp_activity(self.mouse);
        self.overall = clamp_activity(self.overall);
        self
    }

    pub fn percentages(&self) -> ActivityPercentages {
        let ratio = |value: i64| {
            if self.duration <= 0 {
                0.0
            } else {
                let pct = (value as f64 * 100.0) / self.duration as f64;
                (pct * 100.0).round() / 100.0
            }
        };
        ActivityPercentages {
            keyboard: ratio(self.keyboard),
            mouse: ratio(self.mouse),
            overall: ratio(self.overall),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: String,
    pub time_slot_id: Option<String>,
    pub file: String,
    pub thumb: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub time_slot_id: Option<String>,
    pub title: String,
    pub activity_type: Option<String>,
    pub duration: i64,
    pub recorded_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Per-minute activity sample inside a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlotMinute {
    pub id: String,
    pub time_slot_id: Option<String>,
    pub keyboard: i64,
    pub mouse: i64,
    pub recorded_at: DateTime<Utc>,
}

/// A slot with its eagerly loaded children and owning logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlotDetail {
    pub slot: TimeSlot,
    pub screenshots: Vec<Screenshot>,
    pub activities: Vec<Activity>,
    pub minutes: Vec<TimeSlotMinute>,
    pub time_log_ids: Vec<String>,
}

impl TimeSlotDetail {
    pub fn bare(slot: TimeSlot) -> Self {
        Self {
            slot,
            screenshots: Vec::new(),
            activities: Vec::new(),
            minutes: Vec::new(),
            time_log_ids: Vec::new(),
        }
    }
}

/// Slot payload uploaded by a device agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotUpload {
    pub started_at: DateTime<Utc>,
    pub duration: i64,
    pub keyboard: i64,
    pub mouse: i64,
    pub overall: i64,
    #[serde(default)]
    pub time_log_ids: Vec<String>,
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub minutes: Vec<TimeSlotMinute>,
}
