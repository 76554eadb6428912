//! Interval generator
//!
//! Turns a `[start, stop)` range into the sequence of bucket-aligned pieces
//! it covers. Pure and deterministic.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use worktrack_domain::constants::SLOT_SECONDS;
use worktrack_domain::{floor_to_slot, SlotWindow};

/// One piece of a range, never crossing a bucket boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    /// Whole seconds, always `>= 0` and `<= 600`.
    pub duration: i64,
}

impl SlotDescriptor {
    /// Boundary the piece belongs to, as persisted on a slot.
    pub fn bucket_start(&self) -> DateTime<Utc> {
        floor_to_slot(self.started_at)
    }
}

/// Split `[start, stop)` at every 10-minute boundary.
///
/// The first and last pieces are partial when the ends are not aligned. An
/// empty or inverted range yields nothing.
pub fn generate_slots(start: DateTime<Utc>, stop: DateTime<Utc>) -> Vec<SlotDescriptor> {
    let mut slots = Vec::new();
    let mut cursor = start;

    while cursor < stop {
        let boundary = floor_to_slot(cursor) + Duration::seconds(SLOT_SECONDS);
        let next = boundary.min(stop);
        slots.push(SlotDescriptor {
            started_at: cursor,
            stopped_at: next,
            duration: (next - cursor).num_seconds().max(0),
        });
        cursor = next;
    }

    slots
}

/// The single bucket covering `instant`.
pub fn round_to_slot_window(instant: DateTime<Utc>) -> SlotWindow {
    SlotWindow::containing(instant)
}
