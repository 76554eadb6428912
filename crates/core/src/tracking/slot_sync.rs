//! Keeps a log's slot set in step with its range
//!
//! A log owns the slots of every bucket its range touches. After the range
//! changes, slots outside it are released (and deleted once nothing owns
//! them), existing slots inside it are adopted, and web or manual logs get
//! zero-activity slots for buckets nobody recorded.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use worktrack_domain::constants::SLOT_SECONDS;
use worktrack_domain::{
    clamp_activity, DateRange, DeleteMode, LogSource, LogType, Result, TimeLog, TimeLogSlotLink,
    TimeSlot, TimeSlotDetail,
};

use super::cascade::CascadeTargets;
use super::intervals::generate_slots;
use super::ports::{SlotQuery, TrackingStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotSyncReport {
    pub created: usize,
    pub linked: usize,
    pub unlinked: usize,
    pub deleted: usize,
    pub resized: usize,
}

/// Whether missing buckets are filled with engine-generated slots.
///
/// Desktop and mobile agents upload their own slots; a running log is
/// filled when it stops.
pub fn creates_missing_slots(log: &TimeLog) -> bool {
    !log.is_running && (log.log_type == LogType::Manual || log.source == LogSource::Web)
}

/// Reconcile the slots owned by `log` with its current range.
pub fn sync_log_slots(
    store: &mut dyn TrackingStore,
    log: &TimeLog,
    mode: DeleteMode,
    now: DateTime<Utc>,
) -> Result<SlotSyncReport> {
    let mut report = SlotSyncReport::default();
    let range = log.effective_range(now);

    let wanted: BTreeMap<DateTime<Utc>, i64> = generate_slots(range.start, range.end)
        .into_iter()
        .map(|piece| (piece.bucket_start(), piece.duration))
        .collect();

    let mut touched: HashMap<String, TimeSlot> = HashMap::new();
    let mut released = Vec::new();

    for slot in store.find_slots_for_log(&log.tenant_id, &log.id)? {
        if !wanted.contains_key(&slot.started_at) {
            store.unlink_slot(&log.id, &slot.id)?;
            report.unlinked += 1;
            released.push(slot);
        }
    }

    if let (Some(first), Some(last)) = (wanted.keys().next(), wanted.keys().next_back()) {
        let query = SlotQuery {
            tenant_id: log.tenant_id.clone(),
            organization_id: Some(log.organization_id.clone()),
            employee_id: log.employee_id.clone(),
            range: DateRange { start: *first, end: *last + Duration::seconds(SLOT_SECONDS) },
        };

        let mut by_bucket: BTreeMap<DateTime<Utc>, Vec<TimeSlotDetail>> = BTreeMap::new();
        for detail in store.find_slots(&query)? {
            by_bucket.entry(detail.slot.started_at).or_default().push(detail);
        }

        for (bucket, duration) in &wanted {
            match by_bucket.remove(bucket) {
                Some(details) => {
                    for detail in details {
                        if !detail.time_log_ids.contains(&log.id) {
                            store.link_slot(&TimeLogSlotLink {
                                time_log_id: log.id.clone(),
                                time_slot_id: detail.slot.id.clone(),
                                is_primary: detail.time_log_ids.is_empty(),
                            })?;
                            report.linked += 1;
                        }
                        touched.insert(detail.slot.id.clone(), detail.slot);
                    }
                }
                None if creates_missing_slots(log) => {
                    let mut slot = TimeSlot::empty(
                        &log.tenant_id,
                        &log.organization_id,
                        &log.employee_id,
                        *bucket,
                        now,
                    );
                    slot.duration = clamp_activity(*duration);
                    store.insert_time_slot(&slot)?;
                    store.link_slot(&TimeLogSlotLink {
                        time_log_id: log.id.clone(),
                        time_slot_id: slot.id.clone(),
                        is_primary: true,
                    })?;
                    report.created += 1;
                }
                None => {}
            }
        }
    }

    let (kept, orphaned) = split_orphans(store, released)?;
    if !orphaned.is_empty() {
        report.deleted = store.delete_time_slots(&log.tenant_id, &orphaned, mode, now)?;
    }
    touched.extend(kept.into_iter().map(|slot| (slot.id.clone(), slot)));

    report.resized =
        reconcile_slot_durations(store, &log.tenant_id, touched.into_values().collect(), now)?;

    debug!(
        time_log_id = %log.id,
        created = report.created,
        linked = report.linked,
        unlinked = report.unlinked,
        deleted = report.deleted,
        resized = report.resized,
        "slots synchronised"
    );
    Ok(report)
}

/// Delete a log together with the slots only it owned.
///
/// Shared slots stay with their other owners and are resized to what those
/// owners still cover.
pub fn delete_log_with_slots(
    store: &mut dyn TrackingStore,
    log: &TimeLog,
    mode: DeleteMode,
    now: DateTime<Utc>,
) -> Result<CascadeTargets> {
    let slots = store.find_slots_for_log(&log.tenant_id, &log.id)?;
    store.delete_time_logs(&log.tenant_id, std::slice::from_ref(&log.id), mode, now)?;

    let (kept, orphaned) = split_orphans(store, slots)?;
    if !orphaned.is_empty() {
        store.delete_time_slots(&log.tenant_id, &orphaned, mode, now)?;
    }
    reconcile_slot_durations(store, &log.tenant_id, kept, now)?;

    debug!(time_log_id = %log.id, ?mode, orphaned = orphaned.len(), "time log deleted");
    Ok(CascadeTargets::for_log(log))
}

/// Separate slots still owned by a live log from those owned by none.
fn split_orphans(
    store: &mut dyn TrackingStore,
    slots: Vec<TimeSlot>,
) -> Result<(Vec<TimeSlot>, Vec<String>)> {
    if slots.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let ids: Vec<String> = slots.iter().map(|slot| slot.id.clone()).collect();
    let owned: BTreeSet<String> =
        store.find_slot_links(&ids)?.into_iter().map(|link| link.time_slot_id).collect();

    let (kept, orphaned): (Vec<TimeSlot>, Vec<TimeSlot>) =
        slots.into_iter().partition(|slot| owned.contains(&slot.id));
    Ok((kept, orphaned.into_iter().map(|slot| slot.id).collect()))
}

/// Resize slots to the seconds their owners cover. Returns how many changed.
pub fn reconcile_slot_durations(
    store: &mut dyn TrackingStore,
    tenant_id: &str,
    slots: Vec<TimeSlot>,
    now: DateTime<Utc>,
) -> Result<usize> {
    if slots.is_empty() {
        return Ok(0);
    }

    let ids: Vec<String> = slots.iter().map(|slot| slot.id.clone()).collect();
    let links = store.find_slot_links(&ids)?;

    let owner_ids: Vec<String> = links
        .iter()
        .map(|link| link.time_log_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let owners: HashMap<String, TimeLog> = store
        .find_time_logs(tenant_id, &owner_ids)?
        .into_iter()
        .map(|log| (log.id.clone(), log))
        .collect();

    let mut resized = 0;
    for mut slot in slots {
        let bucket = slot.bucket();
        let covered: i64 = links
            .iter()
            .filter(|link| link.time_slot_id == slot.id)
            .filter_map(|link| owners.get(&link.time_log_id))
            .map(|owner| owner.effective_range(now).overlap_secs(&bucket))
            .sum();

        let duration = reconciled_duration(&slot, covered);
        if duration != slot.duration {
            slot.duration = duration;
            slot.keyboard = slot.keyboard.min(duration);
            slot.mouse = slot.mouse.min(duration);
            slot.overall = slot.overall.min(duration);
            slot.updated_at = now;
            store.update_time_slot(&slot)?;
            resized += 1;
        }
    }
    Ok(resized)
}

/// Engine-generated buckets (no recorded activity) follow their owners'
/// coverage; device-reported durations only ever shrink.
pub fn reconciled_duration(slot: &TimeSlot, covered: i64) -> i64 {
    let covered = clamp_activity(covered);
    if slot.keyboard == 0 && slot.mouse == 0 && slot.overall == 0 {
        covered
    } else {
        slot.duration.min(covered)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn slot(duration: i64, overall: i64) -> TimeSlot {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let mut slot = TimeSlot::empty("t", "o", "e", at, at);
        slot.duration = duration;
        slot.overall = overall;
        slot
    }

    #[test]
    fn idle_buckets_follow_coverage() {
        assert_eq!(reconciled_duration(&slot(300, 0), 600), 600);
        assert_eq!(reconciled_duration(&slot(600, 0), 120), 120);
        assert_eq!(reconciled_duration(&slot(600, 0), 1_200), 600);
    }

    #[test]
    fn recorded_buckets_only_shrink() {
        assert_eq!(reconciled_duration(&slot(300, 250), 600), 300);
        assert_eq!(reconciled_duration(&slot(600, 500), 240), 240);
    }

    #[test]
    fn only_stopped_web_or_manual_logs_fill_gaps() {
        let now = Utc::now();
        let mut log = TimeLog::new("t", "o", "e", now, now);
        log.source = LogSource::Web;
        assert!(creates_missing_slots(&log));

        log.source = LogSource::Desktop;
        assert!(!creates_missing_slots(&log));

        log.log_type = LogType::Manual;
        assert!(creates_missing_slots(&log));

        log.is_running = true;
        assert!(!creates_missing_slots(&log));
    }
}
