//! Async command dispatch
//!
//! Store work is synchronous and runs on the blocking pool. The primary
//! mutation commits in its own transaction; the recalculation cascade runs
//! afterwards, one transaction per aggregate, concurrently across ids but
//! never twice at once for the same id.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, instrument, warn};
use worktrack_domain::{whole_seconds, RequestContext, Result, WorkTrackError};

use super::cascade::CascadeTargets;
use super::commands::{Command, CommandOutput, Engine};
use super::ports::{transact, Clock, TrackingDatabase};
use super::recalculation::{recalculate_employee_hours, recalculate_timesheet};

/// One aggregate to recompute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Recalculation {
    Timesheet(String),
    EmployeeHours(String),
}

impl Recalculation {
    /// The aggregate a recalculation command targets directly.
    fn for_command(command: &Command) -> Option<Self> {
        match command {
            Command::TimesheetRecalculate { timesheet_id } => {
                Some(Self::Timesheet(timesheet_id.clone()))
            }
            Command::EmployeeHoursRecalculate { employee_id } => {
                Some(Self::EmployeeHours(employee_id.clone()))
            }
            _ => None,
        }
    }

    fn lock_key(&self, tenant_id: &str) -> String {
        match self {
            Self::Timesheet(id) => format!("{tenant_id}:timesheet:{id}"),
            Self::EmployeeHours(id) => format!("{tenant_id}:employee:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub tenants: usize,
    pub closed: usize,
    pub flipped: usize,
    pub failed: usize,
}

/// Per-key async mutexes, dropped again once nobody holds them.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.inner.entry(key.to_string()).or_default().value())
    }

    /// Forget `key` if no task still holds its mutex.
    pub fn release(&self, key: &str) {
        self.inner.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Entry point for every engine command.
#[derive(Clone)]
pub struct CommandBus {
    db: Arc<dyn TrackingDatabase>,
    clock: Arc<dyn Clock>,
    engine: Arc<Engine>,
    locks: Arc<KeyedLocks>,
}

impl CommandBus {
    pub fn new(db: Arc<dyn TrackingDatabase>, clock: Arc<dyn Clock>, engine: Engine) -> Self {
        Self { db, clock, engine: Arc::new(engine), locks: Arc::new(KeyedLocks::new()) }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Execute `command` and bring the aggregates it touched up to date.
    ///
    /// The command's own writes are atomic. A failed recalculation is
    /// logged and leaves the aggregate stale; it never fails the command.
    #[instrument(skip_all, fields(command = command.name(), tenant_id = %ctx.tenant_id))]
    pub async fn dispatch(&self, ctx: RequestContext, command: Command) -> Result<CommandOutput> {
        let name = command.name();
        let started = Instant::now();
        let tenant_id = ctx.tenant_id.clone();

        // Direct recalculations share the cascade's per-aggregate lock.
        let aggregate_key =
            Recalculation::for_command(&command).map(|job| job.lock_key(&tenant_id));
        let aggregate_lock = aggregate_key.as_deref().map(|key| self.locks.lock_for(key));
        let aggregate_guard = match &aggregate_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let db = Arc::clone(&self.db);
        let engine = Arc::clone(&self.engine);
        let now = whole_seconds(self.clock.now());
        let result = task::spawn_blocking(move || {
            transact(db.as_ref(), |store| engine.execute(store, &ctx, &command, now))
        })
        .await
        .map_err(map_join_error);

        drop(aggregate_guard);
        drop(aggregate_lock);
        if let Some(key) = &aggregate_key {
            self.locks.release(key);
        }

        let mutation = match result? {
            Ok(mutation) => mutation,
            Err(err) => {
                if err.is_client_error() {
                    debug!(command = name, error = %err, "command rejected");
                } else {
                    warn!(command = name, kind = err.label(), error = %err, "command failed");
                }
                return Err(err);
            }
        };

        let cascade = self.run_cascade(&tenant_id, mutation.targets).await;
        debug!(
            command = name,
            recalculated = cascade.succeeded,
            failed_recalculations = cascade.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "command completed"
        );
        Ok(mutation.value)
    }

    /// Recompute every aggregate in `targets`.
    pub async fn run_cascade(&self, tenant_id: &str, targets: CascadeTargets) -> CascadeReport {
        let jobs: Vec<Recalculation> = targets
            .timesheet_ids
            .into_iter()
            .map(Recalculation::Timesheet)
            .chain(targets.employee_ids.into_iter().map(Recalculation::EmployeeHours))
            .collect();
        if jobs.is_empty() {
            return CascadeReport::default();
        }

        let results = join_all(jobs.into_iter().map(|job| self.recalculate(tenant_id, job))).await;

        let mut report = CascadeReport::default();
        for result in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    async fn recalculate(&self, tenant_id: &str, job: Recalculation) -> Result<()> {
        let key = job.lock_key(tenant_id);
        let lock = self.locks.lock_for(&key);
        let guard = lock.lock().await;

        let db = Arc::clone(&self.db);
        let now = whole_seconds(self.clock.now());
        let tenant = tenant_id.to_string();
        let task_job = job.clone();
        let result = task::spawn_blocking(move || {
            transact(db.as_ref(), |store| match &task_job {
                Recalculation::Timesheet(id) => {
                    recalculate_timesheet(store, &tenant, id, now).map(|_| ())
                }
                Recalculation::EmployeeHours(id) => {
                    recalculate_employee_hours(store, &tenant, id).map(|_| ())
                }
            })
        })
        .await
        .map_err(map_join_error)
        .and_then(|inner| inner);

        drop(guard);
        drop(lock);
        self.locks.release(&key);

        if let Err(err) = &result {
            warn!(key = %key, error = %err, "recalculation failed, aggregate left stale");
        }
        result
    }

    /// Sweep every tenant with the periodic, stale-only policy.
    pub async fn sweep_all(&self) -> Result<SweepSummary> {
        let db = Arc::clone(&self.db);
        let tenants = task::spawn_blocking(move || {
            transact(db.as_ref(), |store| store.list_tenant_ids())
        })
        .await
        .map_err(map_join_error)??;

        let mut summary = SweepSummary { tenants: tenants.len(), ..SweepSummary::default() };
        for tenant_id in tenants {
            let command =
                Command::ScheduleTimeLogEntries { organization_id: None, employee_id: None };
            match self.dispatch(RequestContext::system(&tenant_id), command).await {
                Ok(CommandOutput::Swept(report)) => {
                    summary.closed += report.closed;
                    summary.flipped += report.flipped;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(tenant_id = %tenant_id, error = %err, "tenant sweep failed");
                    summary.failed += 1;
                }
            }
        }

        if summary.closed + summary.flipped > 0 || summary.failed > 0 {
            info!(
                tenants = summary.tenants,
                closed = summary.closed,
                flipped = summary.flipped,
                failed = summary.failed,
                "sweep completed"
            );
        }
        Ok(summary)
    }
}

fn map_join_error(err: task::JoinError) -> WorkTrackError {
    WorkTrackError::Internal(format!("blocking task failed: {err}"))
}
