use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::models::{
    ActivityBundle, ActivityDetail, ActivityKind, ActivityRecord, NewWeightEntry, QueuedSyncOp,
    SyncOp, UserProfile, WaterTotals, WeightEntry, round2,
};

const CURRENT_USER_KEY: &str = "current_user_id";
const SESSION_KEY: &str = "remote_session";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS local_state (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS profiles (
                    user_id TEXT PRIMARY KEY NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS activity_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    uuid TEXT,
                    recorded_at TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_activity_user_kind
                    ON activity_records(user_id, kind, recorded_at);

                CREATE TABLE IF NOT EXISTS water_totals (
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    liters REAL NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, date)
                );

                CREATE TABLE IF NOT EXISTS weight_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    time TEXT,
                    note TEXT,
                    recorded_at TEXT NOT NULL,
                    UNIQUE (user_id, date)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sync_queue (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    op TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sync_queue_user ON sync_queue(user_id, id);

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Local state ---

    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO local_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM local_state WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_state(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM local_state WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    pub fn current_user_id(&self) -> Result<Option<String>> {
        self.get_state(CURRENT_USER_KEY)
    }

    pub fn set_current_user_id(&self, user_id: &str) -> Result<()> {
        self.set_state(CURRENT_USER_KEY, user_id)
    }

    /// Stored remote session as raw JSON; decoding is left to the session layer.
    pub fn session_json(&self) -> Result<Option<String>> {
        self.get_state(SESSION_KEY)
    }

    pub fn set_session_json(&self, json: &str) -> Result<()> {
        self.set_state(SESSION_KEY, json)
    }

    pub fn clear_session(&self) -> Result<()> {
        self.delete_state(SESSION_KEY)?;
        self.delete_state(CURRENT_USER_KEY)?;
        Ok(())
    }

    // --- Profiles ---

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let payload = serde_json::to_string(profile)?;
        self.conn.execute(
            "INSERT INTO profiles (user_id, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![profile.id, payload, now],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM profiles WHERE user_id = ?1")?;
        let mut rows = stmt.query(params![user_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let payload: String = row.get(0)?;
        let profile = serde_json::from_str(&payload)
            .with_context(|| format!("Corrupt cached profile for {user_id}"))?;
        Ok(Some(profile))
    }

    pub fn delete_profile(&self, user_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM profiles WHERE user_id = ?1", params![user_id])?;
        Ok(rows > 0)
    }

    pub fn find_profile_by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM profiles WHERE json_extract(payload, '$.email') = ?1 COLLATE NOCASE",
        )?;
        let mut rows = stmt.query(params![email])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let payload: String = row.get(0)?;
        Ok(Some(serde_json::from_str(&payload)?))
    }

    // --- Activity records ---

    pub fn insert_activity(&self, user_id: &str, record: &ActivityRecord) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        let payload = serde_json::to_string(&record.detail)?;
        self.conn.execute(
            "INSERT INTO activity_records (user_id, kind, uuid, recorded_at, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                record.kind().as_str(),
                record.uuid.map(|u| u.to_string()),
                record.date.to_rfc3339(),
                payload,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Records of one kind, newest first.
    pub fn list_activity(&self, user_id: &str, kind: ActivityKind) -> Result<Vec<ActivityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, recorded_at, payload FROM activity_records
             WHERE user_id = ?1 AND kind = ?2
             ORDER BY recorded_at DESC, id DESC",
        )?;
        let records = stmt
            .query_map(params![user_id, kind.as_str()], Self::activity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records.into_iter().flatten().collect())
    }

    /// Replace all records of one kind for a user in a single transaction.
    pub fn replace_activity(
        &mut self,
        user_id: &str,
        kind: ActivityKind,
        records: &[ActivityRecord],
    ) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM activity_records WHERE user_id = ?1 AND kind = ?2",
            params![user_id, kind.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO activity_records (user_id, kind, uuid, recorded_at, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records.iter().filter(|r| r.kind() == kind) {
                stmt.execute(params![
                    user_id,
                    kind.as_str(),
                    record.uuid.map(|u| u.to_string()),
                    record.date.to_rfc3339(),
                    serde_json::to_string(&record.detail)?,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // Rows whose payload no longer parses are skipped rather than failing the list.
    fn activity_from_row(row: &rusqlite::Row) -> rusqlite::Result<Option<ActivityRecord>> {
        let uuid: Option<String> = row.get(0)?;
        let recorded_at: String = row.get(1)?;
        let payload: String = row.get(2)?;

        let Ok(date) = DateTime::parse_from_rfc3339(&recorded_at) else {
            return Ok(None);
        };
        let Ok(detail) = serde_json::from_str::<ActivityDetail>(&payload) else {
            return Ok(None);
        };
        Ok(Some(ActivityRecord {
            uuid: uuid.and_then(|u| Uuid::parse_str(&u).ok()),
            date: date.with_timezone(&Utc),
            detail,
        }))
    }

    // --- Water ---

    /// Add `liters` to the user's total for `date` and return the new total.
    pub fn add_water(&self, user_id: &str, date: NaiveDate, liters: f64) -> Result<f64> {
        let current = self.get_water(user_id, date)?.unwrap_or(0.0);
        let total = round2(current + liters);
        self.set_water(user_id, date, total)?;
        Ok(total)
    }

    pub fn set_water(&self, user_id: &str, date: NaiveDate, liters: f64) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO water_totals (user_id, date, liters, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, date) DO UPDATE SET
                liters = excluded.liters,
                updated_at = excluded.updated_at",
            params![user_id, date.format("%Y-%m-%d").to_string(), liters, now],
        )?;
        Ok(())
    }

    pub fn get_water(&self, user_id: &str, date: NaiveDate) -> Result<Option<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT liters FROM water_totals WHERE user_id = ?1 AND date = ?2")?;
        let mut rows = stmt.query(params![user_id, date.format("%Y-%m-%d").to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_water_totals(&self, user_id: &str) -> Result<WaterTotals> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, liters FROM water_totals WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut totals = WaterTotals::new();
        for row in rows {
            let (date, liters) = row?;
            if let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                totals.insert(date, liters);
            }
        }
        Ok(totals)
    }

    pub fn replace_water(&mut self, user_id: &str, totals: &WaterTotals) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM water_totals WHERE user_id = ?1", params![user_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO water_totals (user_id, date, liters, updated_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (date, liters) in totals {
                stmt.execute(params![user_id, date.format("%Y-%m-%d").to_string(), liters, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // --- Weight ---

    pub fn upsert_weight(&self, user_id: &str, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let now = Utc::now().to_rfc3339();
        let date_str = entry.date.format("%Y-%m-%d").to_string();
        self.conn.execute(
            "INSERT INTO weight_entries (user_id, date, weight_kg, time, note, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, date) DO UPDATE SET
                weight_kg = excluded.weight_kg,
                time = excluded.time,
                note = excluded.note,
                recorded_at = excluded.recorded_at",
            params![user_id, date_str, entry.weight_kg, entry.time, entry.note, now],
        )?;
        self.get_weight(user_id, entry.date)?
            .context("Weight entry not found after upsert")
    }

    pub fn get_weight(&self, user_id: &str, date: NaiveDate) -> Result<Option<WeightEntry>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let mut stmt = self.conn.prepare(
            "SELECT date, weight_kg, time, note, recorded_at
             FROM weight_entries WHERE user_id = ?1 AND date = ?2",
        )?;
        let mut rows = stmt.query(params![user_id, date_str])?;
        if let Some(row) = rows.next()? {
            Ok(Self::weight_entry_from_row(row)?)
        } else {
            Ok(None)
        }
    }

    /// Weight entries newest first, optionally limited to the last `limit` entries.
    pub fn get_weight_history(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, weight_kg, time, note, recorded_at
             FROM weight_entries WHERE user_id = ?1
             ORDER BY date DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit.unwrap_or(-1)], Self::weight_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries.into_iter().flatten().collect())
    }

    pub fn delete_weight(&self, user_id: &str, date: NaiveDate) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM weight_entries WHERE user_id = ?1 AND date = ?2",
            params![user_id, date.format("%Y-%m-%d").to_string()],
        )?;
        Ok(rows > 0)
    }

    pub fn replace_weight(&mut self, user_id: &str, entries: &[WeightEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM weight_entries WHERE user_id = ?1", params![user_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weight_entries (user_id, date, weight_kg, time, note, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, date) DO UPDATE SET
                    weight_kg = excluded.weight_kg,
                    time = excluded.time,
                    note = excluded.note,
                    recorded_at = excluded.recorded_at",
            )?;
            for e in entries {
                stmt.execute(params![
                    user_id,
                    e.date.format("%Y-%m-%d").to_string(),
                    e.weight_kg,
                    e.time,
                    e.note,
                    e.recorded_at.to_rfc3339()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn weight_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<Option<WeightEntry>> {
        let date_str: String = row.get(0)?;
        let recorded_at: String = row.get(4)?;
        let Ok(date) = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") else {
            return Ok(None);
        };
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map_or_else(|_| date_to_utc(date), |d| d.with_timezone(&Utc));
        Ok(Some(WeightEntry {
            date,
            weight_kg: row.get(1)?,
            time: row.get(2)?,
            note: row.get(3)?,
            recorded_at,
        }))
    }

    // --- Bundles ---

    pub fn load_bundle(&self, user_id: &str) -> Result<ActivityBundle> {
        let mut bundle = ActivityBundle::default();
        for kind in ActivityKind::ALL {
            *bundle.records_mut(kind) = self.list_activity(user_id, kind)?;
        }
        bundle.water = self.get_water_totals(user_id)?;
        bundle.weight = self.get_weight_history(user_id, None)?;
        Ok(bundle)
    }

    /// Remove every activity, water, weight and queued sync row for a user.
    pub fn clear_user_data(&mut self, user_id: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in ["activity_records", "water_totals", "weight_entries", "sync_queue"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE user_id = ?1"),
                params![user_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // --- Sync queue ---

    pub fn enqueue_sync(&self, user_id: &str, op: &SyncOp) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sync_queue (user_id, op, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, serde_json::to_string(op)?, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Pending operations in the order they were queued.
    pub fn pending_sync(&self, user_id: &str) -> Result<Vec<QueuedSyncOp>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, op, attempts, last_error, created_at
             FROM sync_queue WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut ops = Vec::with_capacity(rows.len());
        for (id, user_id, op, attempts, last_error, created_at) in rows {
            let op: SyncOp = serde_json::from_str(&op)
                .with_context(|| format!("Corrupt sync queue entry {id}"))?;
            ops.push(QueuedSyncOp {
                id,
                user_id,
                op,
                attempts,
                last_error,
                created_at,
            });
        }
        Ok(ops)
    }

    pub fn complete_sync(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn fail_sync(&self, id: i64, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?1 WHERE id = ?2",
            params![error, id],
        )?;
        Ok(())
    }

    pub fn pending_sync_count(&self, user_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Midnight UTC on `date`, used when only a calendar date is known.
#[must_use]
pub fn date_to_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn steps(n: u32, at: DateTime<Utc>) -> ActivityRecord {
        ActivityRecord::new(ActivityDetail::Steps { steps: n }, at)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_state_set_get_delete() {
        let db = Database::open_in_memory().unwrap();
        db.set_state("k", "v1").unwrap();
        db.set_state("k", "v2").unwrap();
        assert_eq!(db.get_state("k").unwrap().as_deref(), Some("v2"));
        assert!(db.delete_state("k").unwrap());
        assert!(!db.delete_state("k").unwrap());
        assert!(db.get_state("k").unwrap().is_none());
    }

    #[test]
    fn test_clear_session_forgets_current_user() {
        let db = Database::open_in_memory().unwrap();
        db.set_current_user_id("u1").unwrap();
        db.set_session_json("{}").unwrap();
        db.clear_session().unwrap();
        assert!(db.current_user_id().unwrap().is_none());
        assert!(db.session_json().unwrap().is_none());
    }

    #[test]
    fn test_profile_roundtrip_and_lookup_by_email() {
        let db = Database::open_in_memory().unwrap();
        let profile = UserProfile {
            id: "u1".to_string(),
            email: "Budi@Example.com".to_string(),
            height_cm: Some(172.0),
            ..UserProfile::default()
        };
        db.save_profile(&profile).unwrap();
        assert_eq!(db.get_profile("u1").unwrap(), Some(profile.clone()));
        let found = db.find_profile_by_email("budi@example.com").unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(db.get_profile("u2").unwrap().is_none());
    }

    #[test]
    fn test_activity_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        db.insert_activity("u1", &steps(1000, t)).unwrap();
        db.insert_activity("u1", &steps(3000, t + Duration::hours(2))).unwrap();
        db.insert_activity("u2", &steps(9999, t)).unwrap();

        let list = db.list_activity("u1", ActivityKind::Steps).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].detail, ActivityDetail::Steps { steps: 3000 });
        assert!(db.list_activity("u1", ActivityKind::Sleep).unwrap().is_empty());
    }

    #[test]
    fn test_replace_activity_only_touches_one_kind() {
        let mut db = Database::open_in_memory().unwrap();
        let t = Utc::now();
        db.insert_activity("u1", &steps(1000, t)).unwrap();
        db.insert_activity(
            "u1",
            &ActivityRecord::new(ActivityDetail::Sleep { hours: 7.5 }, t),
        )
        .unwrap();

        db.replace_activity("u1", ActivityKind::Steps, &[steps(42, t), steps(43, t)])
            .unwrap();
        assert_eq!(db.list_activity("u1", ActivityKind::Steps).unwrap().len(), 2);
        assert_eq!(db.list_activity("u1", ActivityKind::Sleep).unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_record_without_uuid_loads() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO activity_records (user_id, kind, uuid, recorded_at, payload, created_at)
                 VALUES ('u1', 'running', NULL, '2024-01-01T07:00:00+00:00', '{\"kind\":\"running\"}', '')",
                [],
            )
            .unwrap();
        let list = db.list_activity("u1", ActivityKind::Running).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].uuid.is_none());
        assert_eq!(list[0].detail, ActivityDetail::Running { distance_km: 0.0 });
    }

    #[test]
    fn test_add_water_accumulates_and_rounds() {
        let db = Database::open_in_memory().unwrap();
        let d = date(2024, 5, 1);
        assert!((db.add_water("u1", d, 0.25).unwrap() - 0.25).abs() < f64::EPSILON);
        assert!((db.add_water("u1", d, 0.1).unwrap() - 0.35).abs() < f64::EPSILON);
        assert!((db.add_water("u1", d, 0.2).unwrap() - 0.55).abs() < f64::EPSILON);
        assert_eq!(db.get_water_totals("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_weight_same_date_replaces() {
        let db = Database::open_in_memory().unwrap();
        let d = date(2024, 5, 1);
        db.upsert_weight(
            "u1",
            &NewWeightEntry {
                date: d,
                weight_kg: 70.0,
                time: None,
                note: None,
            },
        )
        .unwrap();
        let second = db
            .upsert_weight(
                "u1",
                &NewWeightEntry {
                    date: d,
                    weight_kg: 69.4,
                    time: Some("07:30".to_string()),
                    note: Some("after run".to_string()),
                },
            )
            .unwrap();
        assert!((second.weight_kg - 69.4).abs() < 0.01);
        let history = db.get_weight_history("u1", None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].note.as_deref(), Some("after run"));
    }

    #[test]
    fn test_weight_history_limit_and_delete() {
        let db = Database::open_in_memory().unwrap();
        for (i, kg) in [70.0, 69.5, 69.0].into_iter().enumerate() {
            db.upsert_weight(
                "u1",
                &NewWeightEntry {
                    date: date(2024, 5, 1 + i as u32),
                    weight_kg: kg,
                    time: None,
                    note: None,
                },
            )
            .unwrap();
        }
        let last_two = db.get_weight_history("u1", Some(2)).unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].date, date(2024, 5, 3));

        assert!(db.delete_weight("u1", date(2024, 5, 3)).unwrap());
        assert!(!db.delete_weight("u1", date(2024, 5, 3)).unwrap());
        assert_eq!(db.get_weight_history("u1", None).unwrap().len(), 2);
    }

    #[test]
    fn test_sync_queue_fifo_and_failure_tracking() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .enqueue_sync(
                "u1",
                &SyncOp::UpsertWater {
                    date: date(2024, 5, 1),
                    total_liters: 0.5,
                },
            )
            .unwrap();
        db.enqueue_sync("u1", &SyncOp::DeleteWeight { date: date(2024, 5, 1) })
            .unwrap();

        db.fail_sync(first, "offline").unwrap();
        let pending = db.pending_sync("u1").unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("offline"));

        db.complete_sync(first).unwrap();
        assert_eq!(db.pending_sync_count("u1").unwrap(), 1);
    }

    #[test]
    fn test_clear_user_data_keeps_other_users() {
        let mut db = Database::open_in_memory().unwrap();
        let t = Utc::now();
        db.insert_activity("u1", &steps(100, t)).unwrap();
        db.insert_activity("u2", &steps(200, t)).unwrap();
        db.add_water("u1", date(2024, 1, 1), 1.0).unwrap();

        db.clear_user_data("u1").unwrap();
        let b1 = db.load_bundle("u1").unwrap();
        assert!(b1.steps.is_empty());
        assert!(b1.water.is_empty());
        assert_eq!(db.load_bundle("u2").unwrap().steps.len(), 1);
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
