//! Half-open time ranges and the 10-minute bucket grid

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::SLOT_SECONDS;
use crate::errors::{Result, WorkTrackError};

/// A `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(WorkTrackError::InvalidInput(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a non-empty range, rejecting `start >= end`.
    pub fn non_empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(WorkTrackError::InvalidInput(format!(
                "range start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds().max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Strict overlap: ranges that only touch at an endpoint do not overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Inclusive membership test on both ends.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Seconds shared by both ranges.
    pub fn overlap_secs(&self, other: &DateRange) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end - start).num_seconds().max(0)
    }

    /// Widen to whole buckets: start floored, end floored after adding one
    /// bucket. Mirrors the window used to fetch slots for a merge.
    pub fn round_outward(&self) -> DateRange {
        let start = floor_to_slot(self.start);
        let end = floor_to_slot(self.end + Duration::seconds(SLOT_SECONDS));
        DateRange { start, end }
    }
}

/// Boundary-aligned `[start, end)` bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SlotWindow {
    pub fn containing(instant: DateTime<Utc>) -> Self {
        let start = floor_to_slot(instant);
        Self { start, end: start + Duration::seconds(SLOT_SECONDS) }
    }

    pub fn as_range(&self) -> DateRange {
        DateRange { start: self.start, end: self.end }
    }
}

/// Floor an instant to the previous 10-minute boundary.
pub fn floor_to_slot(instant: DateTime<Utc>) -> DateTime<Utc> {
    let secs = instant.timestamp();
    let floored = secs - secs.rem_euclid(SLOT_SECONDS);
    DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(instant)
}

/// Drop sub-second precision. Logs and slots are stored in whole seconds.
pub fn whole_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}

pub fn is_slot_aligned(instant: DateTime<Utc>) -> bool {
    instant.timestamp().rem_euclid(SLOT_SECONDS) == 0 && instant.timestamp_subsec_nanos() == 0
}
