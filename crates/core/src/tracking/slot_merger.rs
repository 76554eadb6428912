//! Slot merger
//!
//! Device sync and interactive edits can both write a slot for the same
//! bucket. The merger folds every such group into one new canonical slot,
//! carries the children over, and retires the duplicates. Running it again
//! over the same range finds nothing left to fold.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use worktrack_domain::{
    clamp_activity, DateRange, DeleteMode, Result, SlotWindow, TimeLog, TimeLogSlotLink, TimeSlot,
    TimeSlotDetail,
};

use super::cascade::CascadeTargets;
use super::ports::{SlotQuery, TrackingStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub tenant_id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub range: DateRange,
    pub mode: DeleteMode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Canonical slots created by this run.
    pub slots: Vec<TimeSlot>,
    pub targets: CascadeTargets,
}

/// Combined metrics and owners of one bucket's duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedMetrics {
    pub duration: i64,
    pub keyboard: i64,
    pub mouse: i64,
    pub overall: i64,
    /// Owning logs, de-duplicated, in first-seen order.
    pub time_log_ids: Vec<String>,
}

/// Fold a group of slots sharing one bucket.
///
/// Durations and overall activity are summed. Keyboard and mouse are
/// averaged over the slots that saw keyboard input; slots without any are
/// left out of the denominator. Every metric ends up in `[0, 600]`.
pub fn aggregate_group(group: &[TimeSlotDetail]) -> MergedMetrics {
    let duration: i64 = group.iter().map(|detail| detail.slot.duration).sum();
    let overall: i64 = group.iter().map(|detail| detail.slot.overall).sum();

    let active: Vec<&TimeSlot> =
        group.iter().map(|detail| &detail.slot).filter(|slot| slot.keyboard > 0).collect();
    let mean = |metric: fn(&TimeSlot) -> i64| -> i64 {
        if active.is_empty() {
            return 0;
        }
        let total: i64 = active.iter().map(|slot| metric(slot)).sum();
        (total as f64 / active.len() as f64).round() as i64
    };

    let mut time_log_ids: Vec<String> = Vec::new();
    for id in group.iter().flat_map(|detail| detail.time_log_ids.iter()) {
        if !time_log_ids.contains(id) {
            time_log_ids.push(id.clone());
        }
    }

    MergedMetrics {
        duration: clamp_activity(duration),
        keyboard: clamp_activity(mean(|slot| slot.keyboard)),
        mouse: clamp_activity(mean(|slot| slot.mouse)),
        overall: clamp_activity(overall),
        time_log_ids,
    }
}

/// Merge duplicate slots of one employee inside `request.range`.
///
/// Screenshots, activities, minute records and log links of the folded
/// slots are re-pointed at the canonical slot in place rather than copied
/// into new records, so their ids survive the merge.
#[instrument(
    skip_all,
    fields(employee_id = %request.employee_id, start = %request.range.start, end = %request.range.end)
)]
pub fn merge_range(
    store: &mut dyn TrackingStore,
    request: &MergeRequest,
    now: DateTime<Utc>,
) -> Result<MergeOutcome> {
    let rounded = request.range.round_outward();
    let query = SlotQuery {
        tenant_id: request.tenant_id.clone(),
        organization_id: Some(request.organization_id.clone()),
        employee_id: request.employee_id.clone(),
        range: rounded,
    };

    let mut groups: BTreeMap<SlotWindow, Vec<TimeSlotDetail>> = BTreeMap::new();
    for detail in store.find_slots(&query)? {
        groups.entry(detail.slot.window()).or_default().push(detail);
    }

    let mut outcome = MergeOutcome::default();
    for (window, group) in groups {
        if group.len() < 2 {
            continue;
        }

        let metrics = aggregate_group(&group);
        let owners = store.find_time_logs(&request.tenant_id, &metrics.time_log_ids)?;

        let mut canonical = TimeSlot::empty(
            &request.tenant_id,
            &request.organization_id,
            &request.employee_id,
            window.start,
            now,
        );
        canonical.duration = metrics.duration;
        canonical.keyboard = metrics.keyboard;
        canonical.mouse = metrics.mouse;
        canonical.overall = metrics.overall;
        store.insert_time_slot(&canonical)?;

        let primary = primary_owner(&owners, window);
        for owner in &owners {
            store.link_slot(&TimeLogSlotLink {
                time_log_id: owner.id.clone(),
                time_slot_id: canonical.id.clone(),
                is_primary: primary.is_some_and(|id| id == owner.id),
            })?;
            outcome.targets.add_log(owner);
        }

        let duplicate_ids: Vec<String> =
            group.iter().map(|detail| detail.slot.id.clone()).collect();
        store.reparent_slot_children(&duplicate_ids, &canonical.id)?;
        store.delete_time_slots(&request.tenant_id, &duplicate_ids, request.mode, now)?;

        debug!(
            slot_id = %canonical.id,
            window_start = %window.start,
            merged = duplicate_ids.len(),
            duration = canonical.duration,
            "slots merged"
        );
        outcome.slots.push(canonical);
    }

    outcome.targets.add_employee(request.employee_id.clone());
    if !outcome.slots.is_empty() {
        info!(
            employee_id = %request.employee_id,
            start = %rounded.start,
            end = %rounded.end,
            merged_slots = outcome.slots.len(),
            "duplicate slots merged"
        );
    }
    Ok(outcome)
}

/// The log covering the start of the bucket, else the earliest one.
fn primary_owner(owners: &[TimeLog], window: SlotWindow) -> Option<&str> {
    let covers_start = |log: &&TimeLog| {
        log.started_at <= window.start && log.stopped_at.map_or(true, |end| end > window.start)
    };
    owners
        .iter()
        .find(covers_start)
        .or_else(|| owners.iter().min_by_key(|log| (log.started_at, log.id.as_str())))
        .map(|log| log.id.as_str())
}
