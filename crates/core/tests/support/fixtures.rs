//! Fixtures shared by the scenario tests

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use worktrack_core::{
    transact, Clock, Command, CommandBus, CommandOutput, Engine, ManualTimeInput, SweepSettings,
    TrackingDatabase,
};
use worktrack_domain::{Employee, RequestContext, TimeLog, TimeSlot, TrackingConfig};

use super::memory::MemoryDatabase;

pub const TENANT: &str = "tenant-1";
pub const ORG: &str = "org-1";
pub const EMPLOYEE: &str = "employee-1";

/// 2024-03-04 is a Monday, so a whole working day stays in one ISO week.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

pub fn at_secs(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, second).unwrap()
}

/// Clock pinned to an instant the test controls.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn employee() -> Employee {
    Employee::new(EMPLOYEE, TENANT, ORG)
}

pub fn ctx() -> RequestContext {
    RequestContext::for_employee(TENANT, ORG, EMPLOYEE)
}

pub fn manual(start: DateTime<Utc>, stop: DateTime<Utc>) -> ManualTimeInput {
    ManualTimeInput {
        employee_id: None,
        organization_id: None,
        started_at: start,
        stopped_at: stop,
        log_type: None,
        source: None,
        is_billable: None,
        description: None,
        reason: None,
        project_id: None,
        task_id: None,
        contact_id: None,
        team_id: None,
    }
}

/// Everything a scenario needs: a seeded store, a clock and a bus.
pub struct Harness {
    pub db: Arc<MemoryDatabase>,
    pub clock: Arc<FixedClock>,
    pub bus: CommandBus,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(now, TrackingConfig::default())
    }

    pub fn with_config(now: DateTime<Utc>, tracking: TrackingConfig) -> Self {
        let db = Arc::new(MemoryDatabase::new());
        db.seed_employee(employee());
        let clock = Arc::new(FixedClock::new(now));
        let bus = CommandBus::new(
            db.clone() as Arc<dyn TrackingDatabase>,
            clock.clone() as Arc<dyn Clock>,
            Engine::new(tracking, SweepSettings::default()),
        );
        Self { db, clock, bus }
    }

    pub async fn run(&self, command: Command) -> CommandOutput {
        self.bus.dispatch(ctx(), command).await.expect("command succeeds")
    }

    pub async fn add_manual(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> TimeLog {
        match self.run(Command::TimeLogCreate(manual(start, stop))).await {
            CommandOutput::TimeLog(log) => log,
            other => panic!("unexpected output {other:?}"),
        }
    }

    pub fn logs(&self) -> Vec<TimeLog> {
        self.db.snapshot().live_logs().into_iter().cloned().collect()
    }

    pub fn slots(&self) -> Vec<TimeSlot> {
        self.db.snapshot().live_slots().into_iter().cloned().collect()
    }

    /// Insert a running log directly, bypassing the engine.
    pub fn seed_running_log(&self, started_at: DateTime<Utc>) -> TimeLog {
        let mut log = TimeLog::new(TENANT, ORG, EMPLOYEE, started_at, started_at);
        log.is_running = true;
        let seeded = log.clone();
        self.db.edit(move |state| state.time_logs.push(log));
        seeded
    }

    /// Run a closure in one transaction against the raw store.
    pub fn with_store<T>(
        &self,
        work: impl FnMut(&mut dyn worktrack_core::TrackingStore) -> worktrack_domain::Result<T>,
    ) -> worktrack_domain::Result<T> {
        transact(self.db.as_ref(), work)
    }
}

/// No two live stopped logs of the employee overlap.
pub fn assert_no_overlaps(logs: &[TimeLog]) {
    let mut ranges: Vec<_> = logs.iter().filter_map(TimeLog::range).collect();
    ranges.sort_by_key(|range| range.start);
    for pair in ranges.windows(2) {
        assert!(
            pair[0].end <= pair[1].start,
            "overlapping logs: {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }
}
