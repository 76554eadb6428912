//! Application context - dependency injection container

use std::sync::Arc;

use tracing::{info, warn};
use worktrack_core::{Clock, CommandBus, Engine, SweepSettings, SystemClock, TrackingDatabase};
use worktrack_domain::{Config, Result};
use worktrack_infra::{
    DbManager, EngineSweepJob, SqliteTrackingDatabase, SweepJob, SweepScheduler,
    SweepSchedulerConfig,
};

/// Application context - holds the store, the bus and the sweep scheduler.
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub tracking: SqliteTrackingDatabase,
    pub bus: CommandBus,
    sweep_scheduler: Option<SweepScheduler>,
}

impl AppContext {
    /// Open the database, apply migrations and build the engine.
    ///
    /// The sweep scheduler is registered (so a bad cron expression fails
    /// here) but not started; call [`AppContext::start`] for that.
    pub async fn new(config: Config) -> Result<Self> {
        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;
        db.health_check()?;

        let tracking = SqliteTrackingDatabase::new(Arc::clone(&db), config.database.dialect)?;
        let engine = Engine::new(config.tracking.clone(), SweepSettings::from(&config.sweep));
        let bus = CommandBus::new(
            Arc::new(tracking.clone()) as Arc<dyn TrackingDatabase>,
            Arc::new(SystemClock) as Arc<dyn Clock>,
            engine,
        );

        let sweep_scheduler = if config.sweep.enabled {
            let job: Arc<dyn SweepJob> = Arc::new(EngineSweepJob::new(bus.clone()));
            let scheduler =
                SweepScheduler::with_config(SweepSchedulerConfig::from(&config.sweep), job)
                    .await?;
            Some(scheduler)
        } else {
            info!("scheduler sweep disabled by configuration");
            None
        };

        info!(
            db_path = %db.path().display(),
            dialect = %config.database.dialect,
            "application context initialised"
        );
        Ok(Self { config, db, tracking, bus, sweep_scheduler })
    }

    pub fn sweep_enabled(&self) -> bool {
        self.sweep_scheduler.is_some()
    }

    pub fn sweep_running(&self) -> bool {
        self.sweep_scheduler.as_ref().is_some_and(SweepScheduler::is_running)
    }

    /// Start background work.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(scheduler) = self.sweep_scheduler.as_mut() {
            scheduler.start().await?;
            info!(cron = %self.config.sweep.cron_expression, "scheduler sweep started");
        }
        Ok(())
    }

    /// Stop background work. Failures are logged; shutdown always proceeds.
    pub async fn shutdown(&mut self) {
        if let Some(scheduler) = self.sweep_scheduler.as_mut() {
            if scheduler.is_running() {
                if let Err(err) = scheduler.stop().await {
                    warn!(error = %err, "failed to stop sweep scheduler cleanly");
                }
            }
        }
        info!("application context shut down");
    }
}
