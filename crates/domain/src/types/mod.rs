//! Entities and value types of the interval engine

pub mod context;
pub mod employee;
pub mod range;
pub mod time_log;
pub mod time_slot;
pub mod timesheet;

pub use context::{Permission, RequestContext};
pub use employee::Employee;
pub use range::{floor_to_slot, is_slot_aligned, whole_seconds, DateRange, SlotWindow};
pub use time_log::{DeleteMode, LogSource, LogType, TimeLog, TimeLogSlotLink};
pub use time_slot::{
    clamp_activity, Activity, ActivityPercentages, Screenshot, SlotUpload, TimeSlot,
    TimeSlotDetail, TimeSlotMinute,
};
pub use timesheet::{iso_week_range, SlotAggregate, Timesheet, TimesheetStatus};
