use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::advice::{self, AdviceTopic, TextGenerator};
use crate::db::Database;
use crate::export;
use crate::models::{
    ActivityBundle, ActivityDetail, ActivityKind, ActivityRecord, ExportData, FlushSummary,
    NewWeightEntry, SyncOp, WaterUnit, WeightEntry, WeightSummary, validate_distance,
    validate_food, validate_gym, validate_sleep, validate_steps, validate_water, validate_weight,
};
use crate::reconcile::{self, ReconcileReport};
use crate::remote::{RemoteAuth, RemoteStore};
use crate::stats::{self, DayBoundary, Overview};
use crate::sync;

/// Application state for one client session: the local store, the optional
/// remote backend and the day boundary used for "today".
pub struct Tracker {
    pub(crate) db: Database,
    pub(crate) store: Option<Arc<dyn RemoteStore>>,
    pub(crate) auth: Option<Arc<dyn RemoteAuth>>,
    pub(crate) day_boundary: DayBoundary,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncReport {
    pub flush: FlushSummary,
    pub reconcile: ReconcileReport,
}

impl Tracker {
    pub fn new(db_path: &Path) -> Result<Self> {
        Ok(Self::with_database(Database::open(db_path)?))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    fn with_database(db: Database) -> Self {
        Self {
            db,
            store: None,
            auth: None,
            day_boundary: DayBoundary::default(),
        }
    }

    #[must_use]
    pub fn with_remote(mut self, store: Arc<dyn RemoteStore>, auth: Arc<dyn RemoteAuth>) -> Self {
        self.store = Some(store);
        self.auth = Some(auth);
        self
    }

    #[must_use]
    pub fn with_day_boundary(mut self, boundary: DayBoundary) -> Self {
        self.day_boundary = boundary;
        self
    }

    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.store.is_some()
    }

    #[must_use]
    pub fn day_boundary(&self) -> DayBoundary {
        self.day_boundary
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.day_boundary.today()
    }

    // --- Activity ---

    fn record_activity(&self, detail: ActivityDetail, at: Option<DateTime<Utc>>) -> Result<ActivityRecord> {
        let user_id = self.require_user()?;
        let record = ActivityRecord::new(detail, at.unwrap_or_else(Utc::now));
        self.db.insert_activity(&user_id, &record)?;
        if self.has_remote() {
            self.db.enqueue_sync(
                &user_id,
                &SyncOp::InsertActivity {
                    record: record.clone(),
                },
            )?;
        }
        debug!(kind = %record.kind(), "activity recorded");
        Ok(record)
    }

    pub fn add_steps(&self, steps: i64, at: Option<DateTime<Utc>>) -> Result<ActivityRecord> {
        let steps = validate_steps(steps)?;
        self.record_activity(ActivityDetail::Steps { steps }, at)
    }

    pub fn add_running(&self, distance_km: f64, at: Option<DateTime<Utc>>) -> Result<ActivityRecord> {
        let distance_km = validate_distance(distance_km)?;
        self.record_activity(ActivityDetail::Running { distance_km }, at)
    }

    pub fn add_sleep(&self, hours: f64, at: Option<DateTime<Utc>>) -> Result<ActivityRecord> {
        let hours = validate_sleep(hours)?;
        self.record_activity(ActivityDetail::Sleep { hours }, at)
    }

    pub fn add_gym(
        &self,
        category: &str,
        exercise: &str,
        duration_min: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<ActivityRecord> {
        let (category, exercise, duration_min) = validate_gym(category, exercise, duration_min)?;
        self.record_activity(
            ActivityDetail::Gym {
                category,
                exercise,
                duration_min,
            },
            at,
        )
    }

    pub fn add_food(
        &self,
        name: &str,
        calories: f64,
        carbs: f64,
        protein: f64,
        fat: f64,
        at: Option<DateTime<Utc>>,
    ) -> Result<ActivityRecord> {
        let name = validate_food(name, calories, carbs, protein, fat)?;
        self.record_activity(
            ActivityDetail::Food {
                name,
                calories,
                carbs,
                protein,
                fat,
            },
            at,
        )
    }

    pub fn list_activity(&self, kind: ActivityKind) -> Result<Vec<ActivityRecord>> {
        let user_id = self.require_user()?;
        self.db.list_activity(&user_id, kind)
    }

    // --- Water ---

    /// Add water to a day's total and return the new total in liters.
    ///
    /// The remote store receives the cumulative total, not the increment.
    pub fn add_water(&self, amount: f64, unit: WaterUnit, date: Option<NaiveDate>) -> Result<f64> {
        let user_id = self.require_user()?;
        let liters = unit.to_liters(validate_water(amount)?);
        let date = date.unwrap_or_else(|| self.today());
        let total = self.db.add_water(&user_id, date, liters)?;
        if self.has_remote() {
            self.db.enqueue_sync(
                &user_id,
                &SyncOp::UpsertWater {
                    date,
                    total_liters: total,
                },
            )?;
        }
        Ok(total)
    }

    pub fn water_for(&self, date: NaiveDate) -> Result<f64> {
        let user_id = self.require_user()?;
        Ok(self.db.get_water(&user_id, date)?.unwrap_or(0.0))
    }

    // --- Weight ---

    pub fn log_weight(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let user_id = self.require_user()?;
        validate_weight(entry.weight_kg)?;
        let saved = self.db.upsert_weight(&user_id, entry)?;
        if self.has_remote() {
            self.db.enqueue_sync(
                &user_id,
                &SyncOp::UpsertWeight {
                    entry: saved.clone(),
                },
            )?;
        }
        Ok(saved)
    }

    pub fn get_weight(&self, date: NaiveDate) -> Result<Option<WeightEntry>> {
        let user_id = self.require_user()?;
        self.db.get_weight(&user_id, date)
    }

    pub fn weight_history(&self, limit: Option<i64>) -> Result<Vec<WeightEntry>> {
        let user_id = self.require_user()?;
        self.db.get_weight_history(&user_id, limit)
    }

    pub fn delete_weight(&self, date: NaiveDate) -> Result<()> {
        let user_id = self.require_user()?;
        if !self.db.delete_weight(&user_id, date)? {
            bail!("No weight entry for {date}");
        }
        if self.has_remote() {
            self.db.enqueue_sync(&user_id, &SyncOp::DeleteWeight { date })?;
        }
        Ok(())
    }

    pub fn weight_summary(&self) -> Result<WeightSummary> {
        let user_id = self.require_user()?;
        let entries = self.db.get_weight_history(&user_id, None)?;
        let profile = self.db.get_profile(&user_id)?;
        let (start, target) = profile
            .map_or((None, None), |p| (p.weight_kg, p.target_weight_kg));
        Ok(stats::weight_summary(&entries, start, target))
    }

    // --- Stats ---

    pub fn bundle(&self) -> Result<ActivityBundle> {
        let user_id = self.require_user()?;
        self.db.load_bundle(&user_id)
    }

    pub fn overview(&self, date: Option<NaiveDate>) -> Result<Overview> {
        let bundle = self.bundle()?;
        Ok(stats::overview(
            &bundle,
            self.day_boundary,
            date.unwrap_or_else(|| self.today()),
        ))
    }

    /// Wipe all locally stored activity for the current user.
    pub fn clear_activity(&mut self) -> Result<()> {
        let user_id = self.require_user()?;
        self.db.clear_user_data(&user_id)?;
        info!(user_id = %user_id, "local activity cleared");
        Ok(())
    }

    // --- Advice ---

    /// Advice for `topic`, or `None` when nothing relevant has been logged.
    pub async fn advice(
        &self,
        generator: Option<&dyn TextGenerator>,
        topic: AdviceTopic,
    ) -> Result<Option<String>> {
        let user_id = self.require_user()?;
        let bundle = self.db.load_bundle(&user_id)?;
        let profile = self.db.get_profile(&user_id)?;
        let Some(prompt) = advice::build_prompt(
            topic,
            &bundle,
            profile.as_ref(),
            self.day_boundary,
            self.today(),
        ) else {
            return Ok(None);
        };
        Ok(Some(advice::advise(generator, &prompt).await))
    }

    // --- Sync ---

    /// Push queued writes. `None` when no remote is configured or nobody is signed in.
    pub async fn flush_sync_queue(&self) -> Result<Option<FlushSummary>> {
        let (Some(store), Some(user_id)) = (self.store.clone(), self.db.current_user_id()?) else {
            return Ok(None);
        };
        sync::flush_sync_queue(&self.db, store.as_ref(), &user_id)
            .await
            .map(Some)
    }

    pub async fn reconcile(&mut self) -> Result<ReconcileReport> {
        let user_id = self.require_user()?;
        let store = self
            .store
            .clone()
            .context("Remote sync is not configured")?;
        reconcile::reconcile(&mut self.db, store.as_ref(), &user_id).await
    }

    /// Push pending writes, then pull and merge remote data.
    pub async fn sync(&mut self) -> Result<SyncReport> {
        let flush = self.flush_sync_queue().await?.unwrap_or_default();
        let reconcile = self.reconcile().await?;
        Ok(SyncReport { flush, reconcile })
    }

    pub fn pending_sync_count(&self) -> Result<usize> {
        let user_id = self.require_user()?;
        self.db.pending_sync_count(&user_id)
    }

    // --- Export ---

    pub fn export(&self) -> Result<ExportData> {
        let user_id = self.require_user()?;
        let profile = self.db.get_profile(&user_id)?;
        let bundle = self.db.load_bundle(&user_id)?;
        Ok(export::export_data(profile, bundle))
    }

    pub fn export_weight_csv<W: Write>(&self, out: W) -> Result<usize> {
        let entries = self.weight_history(None)?;
        if entries.is_empty() {
            bail!("No weight entries to export");
        }
        export::write_weight_csv(&entries, out)?;
        Ok(entries.len())
    }
}
