//! # WorkTrack Core
//!
//! Interval engine for time tracking - no infrastructure dependencies.
//!
//! This crate contains:
//! - The interval generator, conflict resolver and span splitter
//! - The slot merger and the recalculation cascade
//! - The scheduler sweep for abandoned timers
//! - Port interfaces (traits) for persistence and time
//! - The command bus that ties it together
//!
//! ## Architecture Principles
//! - Only depends on `worktrack-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Store work is synchronous and transaction-scoped; async lives only in
//!   the bus

pub mod tracking;

pub use tracking::intervals::{generate_slots, round_to_slot_window, SlotDescriptor};
pub use tracking::ports::{
    transact, Clock, OverlapQuery, RunningLogFilter, SlotQuery, SystemClock, TrackingDatabase,
    TrackingStore,
};
pub use tracking::{
    CascadeTargets, Command, CommandBus, CommandOutput, Engine, ManualTimeInput, Mutation,
    SweepPolicy, SweepSettings, TimeLogChanges, TimeLogService, TimerStartInput, TimerStopInput,
};
