//! Merging locally cached activity with what the remote store holds.
//!
//! Remote records are always kept. A local record survives only when the
//! remote side has nothing that looks like the same event: the same UUID when
//! both carry one, otherwise any remote record within [`DEDUP_TOLERANCE_SECS`] of
//! it. The time-window fallback is approximate. Two genuinely distinct events
//! logged less than a minute apart collapse into the remote one, and an event
//! whose client and server clocks disagree by more than a minute is counted
//! twice.
//!
//! Water totals and weight entries are keyed by date. A date with a write
//! still waiting in the sync queue keeps its local value, since the remote
//! copy predates that write.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::models::{ActivityKind, ActivityRecord, SyncOp, WaterTotals, WeightEntry};
use crate::remote::RemoteStore;

/// How many remote rows of each activity kind (and of weight) to pull.
pub const REMOTE_FETCH_LIMIT: usize = 100;
/// How many remote water rows to pull.
pub const WATER_FETCH_LIMIT: usize = 30;
/// Seconds inside which a local and remote record without shared UUIDs are the same event.
pub const DEDUP_TOLERANCE_SECS: i64 = 60;

fn is_same_event(local: &ActivityRecord, remote: &ActivityRecord) -> bool {
    match (local.uuid, remote.uuid) {
        (Some(a), Some(b)) => a == b,
        _ => (local.date - remote.date).abs() < Duration::seconds(DEDUP_TOLERANCE_SECS),
    }
}

/// Union of `local` and `remote`, newest first.
#[must_use]
pub fn merge_records(local: &[ActivityRecord], remote: &[ActivityRecord]) -> Vec<ActivityRecord> {
    let remote_uuids: HashSet<_> = remote.iter().filter_map(|r| r.uuid).collect();

    let mut merged: Vec<ActivityRecord> = remote.to_vec();
    for record in local {
        if record.uuid.is_some_and(|u| remote_uuids.contains(&u)) {
            continue;
        }
        if remote.iter().any(|r| is_same_event(record, r)) {
            continue;
        }
        merged.push(record.clone());
    }
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged
}

/// Shallow union of water totals. Remote values overwrite local ones for the
/// same date, except on `pending` dates.
#[must_use]
pub fn merge_water(
    local: &WaterTotals,
    remote: &WaterTotals,
    pending: &HashSet<NaiveDate>,
) -> WaterTotals {
    let mut merged = local.clone();
    merged.extend(
        remote
            .iter()
            .filter(|(d, _)| !pending.contains(*d))
            .map(|(d, v)| (*d, *v)),
    );
    merged
}

/// Union of weight entries keyed by date, newest date first. Remote wins
/// except on `pending` dates, where the local state (including a deletion)
/// stands.
#[must_use]
pub fn merge_weight(
    local: &[WeightEntry],
    remote: &[WeightEntry],
    pending: &HashSet<NaiveDate>,
) -> Vec<WeightEntry> {
    let mut by_date: HashMap<NaiveDate, WeightEntry> =
        local.iter().map(|e| (e.date, e.clone())).collect();
    for entry in remote.iter().filter(|e| !pending.contains(&e.date)) {
        by_date.insert(entry.date, entry.clone());
    }
    let mut merged: Vec<WeightEntry> = by_date.into_values().collect();
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TypeOutcome {
    Merged { local: usize, remote: usize, merged: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: TypeOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub types: Vec<TypeReport>,
}

impl ReconcileReport {
    fn merged(&mut self, name: &str, local: usize, remote: usize, merged: usize) {
        self.types.push(TypeReport {
            name: name.to_string(),
            outcome: TypeOutcome::Merged {
                local,
                remote,
                merged,
            },
        });
    }

    fn failed(&mut self, name: &str, error: &anyhow::Error) {
        warn!(kind = name, error = %format!("{error:#}"), "remote fetch failed, keeping local data");
        self.types.push(TypeReport {
            name: name.to_string(),
            outcome: TypeOutcome::Failed {
                error: format!("{error:#}"),
            },
        });
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.types
            .iter()
            .filter(|t| matches!(t.outcome, TypeOutcome::Failed { .. }))
            .count()
    }
}

/// Water and weight dates with queued, not yet pushed writes.
#[derive(Debug, Default)]
struct PendingDates {
    water: HashSet<NaiveDate>,
    weight: HashSet<NaiveDate>,
}

impl PendingDates {
    fn load(db: &Database, user_id: &str) -> Result<Self> {
        let mut pending = Self::default();
        for queued in db.pending_sync(user_id)? {
            match queued.op {
                SyncOp::UpsertWater { date, .. } => {
                    pending.water.insert(date);
                }
                SyncOp::UpsertWeight { entry } => {
                    pending.weight.insert(entry.date);
                }
                SyncOp::DeleteWeight { date } => {
                    pending.weight.insert(date);
                }
                SyncOp::InsertActivity { .. } | SyncOp::UpsertProfile { .. } => {}
            }
        }
        Ok(pending)
    }
}

/// Pull every remote collection for `user_id` and fold it into the local store.
///
/// All fetches run concurrently. Each type is then merged and written on its
/// own, so a failed fetch leaves that type untouched without affecting the
/// rest. Only local store errors abort the run.
pub async fn reconcile(
    db: &mut Database,
    remote: &dyn RemoteStore,
    user_id: &str,
) -> Result<ReconcileReport> {
    let activity_fetches = ActivityKind::ALL
        .into_iter()
        .map(|kind| remote.fetch_activity(user_id, kind, REMOTE_FETCH_LIMIT));
    let (activity, water, weight) = futures::join!(
        join_all(activity_fetches),
        remote.fetch_water(user_id, WATER_FETCH_LIMIT),
        remote.fetch_weight(user_id, REMOTE_FETCH_LIMIT),
    );

    let pending = PendingDates::load(db, user_id)?;
    if !pending.water.is_empty() || !pending.weight.is_empty() {
        debug!(
            water = pending.water.len(),
            weight = pending.weight.len(),
            "keeping local values for dates with queued writes"
        );
    }
    let mut report = ReconcileReport::default();

    for (kind, fetched) in ActivityKind::ALL.into_iter().zip(activity) {
        match fetched {
            Ok(remote_records) => {
                let local = db.list_activity(user_id, kind)?;
                let merged = merge_records(&local, &remote_records);
                debug!(%kind, local = local.len(), remote = remote_records.len(), merged = merged.len(), "merged");
                db.replace_activity(user_id, kind, &merged)?;
                report.merged(kind.as_str(), local.len(), remote_records.len(), merged.len());
            }
            Err(e) => report.failed(kind.as_str(), &e),
        }
    }

    match water {
        Ok(remote_water) => {
            let local = db.get_water_totals(user_id)?;
            let merged = merge_water(&local, &remote_water, &pending.water);
            db.replace_water(user_id, &merged)?;
            report.merged("water", local.len(), remote_water.len(), merged.len());
        }
        Err(e) => report.failed("water", &e),
    }

    match weight {
        Ok(remote_weight) => {
            let local = db.get_weight_history(user_id, None)?;
            let merged = merge_weight(&local, &remote_weight, &pending.weight);
            db.replace_weight(user_id, &merged)?;
            report.merged("weight", local.len(), remote_weight.len(), merged.len());
        }
        Err(e) => report.failed("weight", &e),
    }

    info!(
        user_id,
        failures = report.failures(),
        "reconciliation finished"
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ActivityDetail, UserProfile};
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory remote used across core tests.
    #[derive(Default)]
    pub(crate) struct MockRemote {
        pub activity: Mutex<HashMap<ActivityKind, Vec<ActivityRecord>>>,
        pub water: Mutex<WaterTotals>,
        pub weight: Mutex<Vec<WeightEntry>>,
        pub profiles: Mutex<HashMap<String, UserProfile>>,
        pub failing: Mutex<HashSet<&'static str>>,
        pub water_writes: Mutex<Vec<(NaiveDate, f64)>>,
    }

    impl MockRemote {
        pub(crate) fn fail(&self, what: &'static str) {
            self.failing.lock().unwrap().insert(what);
        }

        fn check(&self, what: &str) -> Result<()> {
            if self.failing.lock().unwrap().contains(what) {
                bail!("{what} unavailable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for MockRemote {
        async fn fetch_activity(
            &self,
            _user_id: &str,
            kind: ActivityKind,
            limit: usize,
        ) -> Result<Vec<ActivityRecord>> {
            self.check(kind.as_str())?;
            let mut rows = self
                .activity
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .unwrap_or_default();
            rows.sort_by(|a, b| b.date.cmp(&a.date));
            rows.truncate(limit);
            Ok(rows)
        }

        async fn insert_activity(&self, _user_id: &str, record: &ActivityRecord) -> Result<()> {
            self.check("insert")?;
            self.activity
                .lock()
                .unwrap()
                .entry(record.kind())
                .or_default()
                .push(record.clone());
            Ok(())
        }

        async fn fetch_water(&self, _user_id: &str, _limit: usize) -> Result<WaterTotals> {
            self.check("water")?;
            Ok(self.water.lock().unwrap().clone())
        }

        async fn upsert_water(&self, _user_id: &str, date: NaiveDate, total: f64) -> Result<()> {
            self.check("upsert_water")?;
            self.water.lock().unwrap().insert(date, total);
            self.water_writes.lock().unwrap().push((date, total));
            Ok(())
        }

        async fn fetch_weight(&self, _user_id: &str, _limit: usize) -> Result<Vec<WeightEntry>> {
            self.check("weight")?;
            Ok(self.weight.lock().unwrap().clone())
        }

        async fn upsert_weight(&self, _user_id: &str, entry: &WeightEntry) -> Result<()> {
            self.check("upsert_weight")?;
            let mut w = self.weight.lock().unwrap();
            w.retain(|e| e.date != entry.date);
            w.push(entry.clone());
            Ok(())
        }

        async fn delete_weight(&self, _user_id: &str, date: NaiveDate) -> Result<()> {
            self.check("delete_weight")?;
            self.weight.lock().unwrap().retain(|e| e.date != date);
            Ok(())
        }

        async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
            self.check("profile")?;
            Ok(self.profiles.lock().unwrap().get(user_id).cloned())
        }

        async fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
            self.check("upsert_profile")?;
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.id.clone(), profile.clone());
            Ok(())
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 10, h, m, s).unwrap()
    }

    fn steps(n: u32, date: DateTime<Utc>, uuid: Option<Uuid>) -> ActivityRecord {
        ActivityRecord {
            uuid,
            date,
            detail: ActivityDetail::Steps { steps: n },
        }
    }

    fn weight(day: u32, kg: f64) -> WeightEntry {
        let date = NaiveDate::from_ymd_opt(2024, 4, day).unwrap();
        WeightEntry {
            date,
            weight_kg: kg,
            time: None,
            note: None,
            recorded_at: crate::db::date_to_utc(date),
        }
    }

    #[test]
    fn test_merge_keeps_local_with_empty_remote() {
        let local = vec![steps(5000, at(8, 0, 0), None)];
        let merged = merge_records(&local, &[]);
        assert_eq!(merged, local);
    }

    #[test]
    fn test_merge_drops_local_within_tolerance() {
        let local = vec![steps(5000, at(8, 0, 30), None)];
        let remote = vec![steps(5000, at(8, 0, 0), None)];
        let merged = merge_records(&local, &remote);
        assert_eq!(merged, remote);
    }

    #[test]
    fn test_merge_tolerance_is_strict() {
        let local = vec![steps(4000, at(8, 1, 0), None)];
        let remote = vec![steps(5000, at(8, 0, 0), None)];
        assert_eq!(merge_records(&local, &remote).len(), 2);
    }

    #[test]
    fn test_merge_uuid_match_ignores_time() {
        let id = Uuid::new_v4();
        let local = vec![steps(5000, at(8, 0, 0), Some(id))];
        let remote = vec![steps(5000, at(9, 30, 0), Some(id))];
        let merged = merge_records(&local, &remote);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].date, at(9, 30, 0));
    }

    #[test]
    fn test_merge_distinct_uuids_within_window_both_kept() {
        let local = vec![steps(100, at(8, 0, 10), Some(Uuid::new_v4()))];
        let remote = vec![steps(200, at(8, 0, 0), Some(Uuid::new_v4()))];
        assert_eq!(merge_records(&local, &remote).len(), 2);
    }

    #[test]
    fn test_merge_keeps_every_remote_and_sorts_desc() {
        let remote = vec![
            steps(1, at(6, 0, 0), None),
            steps(2, at(6, 0, 20), None),
            steps(3, at(12, 0, 0), None),
        ];
        let local = vec![steps(9, at(10, 0, 0), None), steps(8, at(6, 0, 10), None)];
        let merged = merge_records(&local, &remote);
        assert_eq!(merged.len(), 4);
        for r in &remote {
            assert!(merged.contains(r));
        }
        assert!(merged.windows(2).all(|w| w[0].date >= w[1].date));
        assert_eq!(merged[0].detail, ActivityDetail::Steps { steps: 3 });
    }

    #[test]
    fn test_merge_water_remote_wins() {
        let d1 = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();
        let local: WaterTotals = [(d1, 1.0), (d2, 0.5)].into_iter().collect();
        let remote: WaterTotals = [(d2, 2.0)].into_iter().collect();
        let merged = merge_water(&local, &remote, &HashSet::new());
        assert!((merged[&d1] - 1.0).abs() < f64::EPSILON);
        assert!((merged[&d2] - 2.0).abs() < f64::EPSILON);

        let pending: HashSet<_> = [d2].into_iter().collect();
        let merged = merge_water(&local, &remote, &pending);
        assert!((merged[&d2] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_weight_unique_dates() {
        let local = vec![weight(3, 70.0), weight(1, 71.0)];
        let remote = vec![weight(3, 69.5), weight(2, 70.5)];
        let merged = merge_weight(&local, &remote, &HashSet::new());
        assert_eq!(merged.len(), 3);
        assert!((merged[0].weight_kg - 69.5).abs() < 0.01);
        let dates: HashSet<_> = merged.iter().map(|e| e.date).collect();
        assert_eq!(dates.len(), merged.len());
    }

    #[test]
    fn test_merge_weight_pending_dates_keep_local_state() {
        let local = vec![weight(3, 70.0)];
        let remote = vec![weight(3, 69.5), weight(2, 70.5)];
        let pending: HashSet<_> = [3, 2]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap())
            .collect();
        // Day 2 was deleted locally and day 3 edited, neither pushed yet.
        let merged = merge_weight(&local, &remote, &pending);
        assert_eq!(merged, vec![weight(3, 70.0)]);
    }

    #[tokio::test]
    async fn test_reconcile_empty_remote_keeps_single_local_entry() {
        let mut db = Database::open_in_memory().unwrap();
        let local = steps(5000, at(8, 0, 0), Some(Uuid::new_v4()));
        db.insert_activity("u1", &local).unwrap();

        let remote = MockRemote::default();
        let report = reconcile(&mut db, &remote, "u1").await.unwrap();

        assert_eq!(report.failures(), 0);
        let after = db.list_activity("u1", ActivityKind::Steps).unwrap();
        assert_eq!(after, vec![local]);
    }

    #[tokio::test]
    async fn test_reconcile_failure_is_per_type() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_activity("u1", &steps(5000, at(8, 0, 0), None)).unwrap();
        db.add_water("u1", NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(), 0.5)
            .unwrap();

        let remote = MockRemote::default();
        remote.fail("steps");
        remote.activity.lock().unwrap().insert(
            ActivityKind::Sleep,
            vec![ActivityRecord {
                uuid: None,
                date: at(23, 0, 0),
                detail: ActivityDetail::Sleep { hours: 7.0 },
            }],
        );
        remote.water.lock().unwrap().insert(
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            1.25,
        );

        let report = reconcile(&mut db, &remote, "u1").await.unwrap();
        assert_eq!(report.failures(), 1);
        assert_eq!(report.types.len(), 7);

        assert_eq!(db.list_activity("u1", ActivityKind::Steps).unwrap().len(), 1);
        assert_eq!(db.list_activity("u1", ActivityKind::Sleep).unwrap().len(), 1);
        let water = db
            .get_water("u1", NaiveDate::from_ymd_opt(2024, 4, 10).unwrap())
            .unwrap();
        assert_eq!(water, Some(1.25));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_activity("u1", &steps(1200, at(7, 0, 0), Some(Uuid::new_v4())))
            .unwrap();
        let remote = MockRemote::default();
        remote
            .activity
            .lock()
            .unwrap()
            .insert(ActivityKind::Steps, vec![steps(800, at(18, 0, 0), None)]);

        reconcile(&mut db, &remote, "u1").await.unwrap();
        reconcile(&mut db, &remote, "u1").await.unwrap();
        assert_eq!(db.list_activity("u1", ActivityKind::Steps).unwrap().len(), 2);
    }
}
