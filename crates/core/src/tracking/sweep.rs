//! Scheduler sweep
//!
//! Closes logs left running by clients that went away. A log moves from
//! running to closed exactly once; a stopped log is never reopened here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use worktrack_domain::constants::{ABANDONED_LOG_SECONDS, STALE_AFTER_MINUTES};
use worktrack_domain::{DeleteMode, Result, SweepConfig, TimeLog, TimeSlot};

use super::cascade::CascadeTargets;
use super::ports::{RunningLogFilter, TrackingStore};
use super::slot_sync::sync_log_slots;

/// When a running log is considered abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// Silence after which a log or its last slot counts as stale.
    pub stale_after: Duration,
    /// Length given to a log that never recorded a slot.
    pub abandoned_length: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(STALE_AFTER_MINUTES),
            abandoned_length: Duration::seconds(ABANDONED_LOG_SECONDS),
        }
    }
}

impl From<&SweepConfig> for SweepSettings {
    fn from(config: &SweepConfig) -> Self {
        Self {
            stale_after: Duration::minutes(config.stale_after_minutes.max(1)),
            ..Self::default()
        }
    }
}

/// Whether fresh logs are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPolicy {
    /// Close only logs that have gone stale. Used by the periodic job.
    #[default]
    StaleOnly,
    /// Close every pending log. Used before a new timer starts.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SweepDecision {
    /// Still active; leave it running.
    Skip,
    /// Write `stopped_at` and clear the running flag.
    Close { stopped_at: DateTime<Utc> },
    /// Already has a stop time; only clear the running flag.
    Flip,
}

/// Decide what the sweep does with one pending log.
///
/// `slots` are the log's slots in ascending start order.
pub fn decide(
    log: &TimeLog,
    slots: &[TimeSlot],
    now: DateTime<Utc>,
    settings: &SweepSettings,
    policy: SweepPolicy,
) -> SweepDecision {
    if log.stopped_at.is_some() {
        return SweepDecision::Flip;
    }

    let abandoned_at = log.started_at + settings.abandoned_length;
    let Some(last) = slots.last() else {
        return if now - log.started_at > settings.stale_after {
            SweepDecision::Close { stopped_at: abandoned_at }
        } else if policy == SweepPolicy::Force {
            SweepDecision::Close { stopped_at: now.max(log.started_at) }
        } else {
            SweepDecision::Skip
        };
    };

    let recorded: i64 = slots.iter().map(|slot| slot.duration.max(0)).sum();
    let mut stopped_at = log.started_at + Duration::seconds(recorded);
    if stopped_at - last.started_at > settings.stale_after {
        stopped_at = last.recorded_end();
    }
    if stopped_at <= log.started_at {
        stopped_at = abandoned_at;
    }

    if now - stopped_at > settings.stale_after || policy == SweepPolicy::Force {
        SweepDecision::Close { stopped_at }
    } else {
        SweepDecision::Skip
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub closed: usize,
    pub flipped: usize,
    pub skipped: usize,
    pub targets: CascadeTargets,
}

/// Close stale running logs matching `filter`.
#[instrument(skip_all, fields(tenant_id = %filter.tenant_id, policy = ?policy))]
pub fn sweep_pending(
    store: &mut dyn TrackingStore,
    filter: &RunningLogFilter,
    now: DateTime<Utc>,
    settings: &SweepSettings,
    policy: SweepPolicy,
) -> Result<SweepReport> {
    let pending = store.find_running_logs(filter)?;
    let mut report = SweepReport { examined: pending.len(), ..SweepReport::default() };

    for log in pending {
        let mut slots = store.find_slots_for_log(&log.tenant_id, &log.id)?;
        slots.sort_by_key(|slot| slot.started_at);

        match decide(&log, &slots, now, settings, policy) {
            SweepDecision::Skip => {
                report.skipped += 1;
            }
            SweepDecision::Flip => {
                let mut closed = log.clone();
                closed.is_running = false;
                closed.updated_at = now;
                store.update_time_log(&closed)?;
                report.flipped += 1;
                report.targets.add_log(&closed);
            }
            SweepDecision::Close { stopped_at } => {
                let mut closed = log.clone();
                closed.stopped_at = Some(stopped_at);
                closed.is_running = false;
                closed.updated_at = now;
                store.update_time_log(&closed)?;
                sync_log_slots(store, &closed, DeleteMode::Soft, now)?;
                debug!(time_log_id = %closed.id, %stopped_at, "pending time log closed");
                report.closed += 1;
                report.targets.add_log(&closed);
            }
        }
    }

    if report.closed + report.flipped > 0 {
        info!(
            tenant_id = %filter.tenant_id,
            examined = report.examined,
            closed = report.closed,
            flipped = report.flipped,
            "sweep finished"
        );
    }
    Ok(report)
}
