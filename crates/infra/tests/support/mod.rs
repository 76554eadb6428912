//! Shared test helpers for `worktrack-infra` integration tests.
//!
//! Each harness owns a migrated SQLite file in a temporary directory and a
//! command bus wired to it, the same way the daemon wires them.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use worktrack_core::{
    transact, Clock, Command, CommandBus, CommandOutput, Engine, ManualTimeInput, OverlapQuery,
    SlotQuery, SweepSettings, TrackingDatabase, TrackingStore,
};
use worktrack_domain::{
    DateRange, Employee, RequestContext, Result, SqlDialect, TimeLog, TimeSlotDetail, Timesheet,
    TrackingConfig,
};
use worktrack_infra::database::{DbManager, SqliteTrackingDatabase};

pub const TENANT: &str = "tenant-1";
pub const ORG: &str = "org-1";
pub const EMPLOYEE: &str = "employee-1";

const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// 2024-03-04 is a Monday.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

pub fn at_secs(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, second).unwrap()
}

pub fn whole_day() -> DateRange {
    DateRange { start: at(0, 0), end: at(0, 0) + Duration::days(1) }
}

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
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
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

/// Migrated SQLCipher database plus a bus dispatching against it.
pub struct SqliteHarness {
    pub tracking: SqliteTrackingDatabase,
    pub clock: Arc<FixedClock>,
    pub bus: CommandBus,
    _temp_dir: TempDir,
}

impl SqliteHarness {
    pub async fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(now, TrackingConfig::default()).await
    }

    pub async fn with_config(now: DateTime<Utc>, tracking_config: TrackingConfig) -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager = DbManager::new(temp_dir.path().join("engine.db"), 4, Some(TEST_DB_KEY))
            .expect("db manager should be created");
        manager.run_migrations().expect("schema migrations should apply");

        let tracking = SqliteTrackingDatabase::new(Arc::new(manager), SqlDialect::Sqlite)
            .expect("sqlite store should be created");
        tracking
            .upsert_employee(Employee::new(EMPLOYEE, TENANT, ORG))
            .await
            .expect("employee should be seeded");

        let clock = Arc::new(FixedClock::new(now));
        let bus = CommandBus::new(
            Arc::new(tracking.clone()) as Arc<dyn TrackingDatabase>,
            clock.clone() as Arc<dyn Clock>,
            Engine::new(tracking_config, SweepSettings::default()),
        );
        Self { tracking, clock, bus, _temp_dir: temp_dir }
    }

    pub async fn run(&self, command: Command) -> CommandOutput {
        self.bus.dispatch(ctx(), command).await.expect("command should succeed")
    }

    pub async fn add_manual(&self, start: DateTime<Utc>, stop: DateTime<Utc>) -> TimeLog {
        match self.run(Command::TimeLogCreate(manual(start, stop))).await {
            CommandOutput::TimeLog(log) => log,
            other => panic!("unexpected output {other:?}"),
        }
    }

    pub fn with_store<T>(
        &self,
        work: impl FnMut(&mut dyn TrackingStore) -> Result<T>,
    ) -> Result<T> {
        transact(&self.tracking, work)
    }

    /// Live stopped logs of the test employee on the test day.
    pub fn stopped_logs(&self) -> Vec<TimeLog> {
        let query = OverlapQuery {
            tenant_id: TENANT.into(),
            employee_id: EMPLOYEE.into(),
            range: whole_day(),
            exclude_ids: Vec::new(),
        };
        self.with_store(|store| store.find_overlapping_logs(&query)).expect("logs should load")
    }

    pub fn slots(&self) -> Vec<TimeSlotDetail> {
        let query = SlotQuery {
            tenant_id: TENANT.into(),
            organization_id: None,
            employee_id: EMPLOYEE.into(),
            range: whole_day(),
        };
        self.with_store(|store| store.find_slots(&query)).expect("slots should load")
    }

    pub fn timesheet(&self, id: &str) -> Timesheet {
        self.with_store(|store| store.find_timesheet(TENANT, id))
            .expect("timesheet query should succeed")
            .expect("timesheet should exist")
    }

    pub fn total_hours(&self) -> i64 {
        self.with_store(|store| store.find_employee(TENANT, EMPLOYEE))
            .expect("employee query should succeed")
            .expect("employee should exist")
            .total_work_hours
    }

    pub fn count_rows(&self, sql: &str) -> i64 {
        let conn = self.tracking.manager().get_connection().expect("connection available");
        conn.query_row(sql, [], |row| row.get(0)).expect("count query should succeed")
    }
}
