//! Interval engine: time logs, slots, timesheets and the operations that
//! keep them consistent

pub mod bus;
pub mod cascade;
pub mod commands;
pub mod conflicts;
pub mod intervals;
pub mod ports;
pub mod recalculation;
pub mod service;
pub mod slot_merger;
pub mod slot_sync;
pub mod span_splitter;
pub mod sweep;
pub mod timer;

pub use bus::{CascadeReport, CommandBus, KeyedLocks, SweepSummary};
pub use cascade::{CascadeTargets, Mutation};
pub use commands::{Command, CommandOutput, Engine};
pub use service::{IngestReport, ManualTimeInput, TimeLogChanges, TimeLogService};
pub use span_splitter::{SpanOutcome, SpanPlan};
pub use sweep::{SweepDecision, SweepPolicy, SweepReport, SweepSettings};
pub use timer::{TimerStartInput, TimerStopInput};
