//! Cron-driven sweep of abandoned timers.
//!
//! Each tick runs a [`SweepJob`] under a timeout. The production job asks
//! the [`CommandBus`] to sweep every tenant; a failed or slow tick is
//! logged and the next tick tries again.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use worktrack_core::CommandBus;
//! use worktrack_infra::scheduling::{
//!     EngineSweepJob, SchedulerResult, SweepScheduler, SweepSchedulerConfig,
//! };
//!
//! # async fn example(bus: CommandBus) -> SchedulerResult<()> {
//! let job = Arc::new(EngineSweepJob::new(bus));
//! let mut scheduler = SweepScheduler::with_config(
//!     SweepSchedulerConfig { cron_expression: "0 * * * * *".into(), ..Default::default() },
//!     job,
//! )
//! .await?;
//!
//! scheduler.start().await?;
//! // ... daemon runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use worktrack_core::CommandBus;
use worktrack_domain::{Result as DomainResult, SweepConfig};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// One sweep pass.
#[async_trait]
pub trait SweepJob: Send + Sync {
    async fn run(&self) -> DomainResult<()>;
}

/// Sweeps every tenant through the engine's command bus.
#[derive(Clone)]
pub struct EngineSweepJob {
    bus: CommandBus,
}

impl EngineSweepJob {
    pub fn new(bus: CommandBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl SweepJob for EngineSweepJob {
    async fn run(&self) -> DomainResult<()> {
        let summary = self.bus.sweep_all().await?;
        debug!(
            tenants = summary.tenants,
            closed = summary.closed,
            flipped = summary.flipped,
            failed = summary.failed,
            "sweep tick finished"
        );
        Ok(())
    }
}

/// Configuration for the sweep scheduler.
#[derive(Debug, Clone)]
pub struct SweepSchedulerConfig {
    /// Six-field cron expression (seconds first).
    pub cron_expression: String,
    /// Timeout applied to a single sweep.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for SweepSchedulerConfig {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SweepSchedulerConfig {
    fn from(config: &SweepConfig) -> Self {
        Self {
            cron_expression: config.cron_expression.clone(),
            job_timeout: Duration::from_secs(config.job_timeout_secs.max(1)),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Sweep scheduler with explicit lifecycle management.
pub struct SweepScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: SweepSchedulerConfig,
    job_id: Uuid,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    job: Arc<dyn SweepJob>,
}

impl SweepScheduler {
    /// Create a scheduler with default timeouts.
    pub async fn new(cron_expression: String, job: Arc<dyn SweepJob>) -> SchedulerResult<Self> {
        let config = SweepSchedulerConfig { cron_expression, ..SweepSchedulerConfig::default() };
        Self::with_config(config, job).await
    }

    /// Create a scheduler with a custom configuration.
    ///
    /// An invalid cron expression fails here, before anything starts.
    pub async fn with_config(
        config: SweepSchedulerConfig,
        job: Arc<dyn SweepJob>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed { source })?;

        let mut scheduler = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            job_id: Uuid::nil(),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            job,
        };

        scheduler.job_id = scheduler.register_sweep_job().await?;
        Ok(scheduler)
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler = self.scheduler.clone();
        let start_timeout = self.config.start_timeout;
        let start_result = tokio::time::timeout(start_timeout, async move {
            let guard = scheduler.write().await;
            guard.start().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?;

        start_result.map_err(|source| SchedulerError::StartFailed { source })?;

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!("Sweep scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let scheduler = self.scheduler.clone();
        let stop_timeout = self.config.stop_timeout;
        let stop_result = tokio::time::timeout(stop_timeout, async move {
            let mut guard = scheduler.write().await;
            guard.shutdown().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?;

        stop_result.map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Sweep scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when the monitor task is active.
    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    async fn register_sweep_job(&mut self) -> SchedulerResult<Uuid> {
        if self.job_id != Uuid::nil() {
            return Ok(self.job_id);
        }

        let job = self.job.clone();
        let job_timeout = self.config.job_timeout;

        let job_definition =
            Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
                let job = job.clone();

                Box::pin(async move {
                    let started = Instant::now();
                    match tokio::time::timeout(job_timeout, job.run()).await {
                        Ok(Ok(())) => {
                            debug!(
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Sweep finished successfully"
                            );
                        }
                        Ok(Err(err)) => {
                            error!(error = %err, kind = err.label(), "Sweep failed");
                        }
                        Err(_) => {
                            warn!(timeout_secs = job_timeout.as_secs(), "Sweep timed out");
                        }
                    }
                })
            })
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job_definition.guid();
        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered sweep job");
        Ok(job_id)
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Sweep scheduler monitor cancelled");
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SweepScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
