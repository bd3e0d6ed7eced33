//! Remote table store and auth seams, plus the row shapes used on the wire.
//!
//! The CLI implements [`RemoteStore`] and [`RemoteAuth`] against Supabase
//! with reqwest. Core code only ever sees the domain types.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::date_to_utc;
use crate::models::{
    ActivityDetail, ActivityKind, ActivityRecord, AuthMethod, Goal, Sex, UserProfile, WaterTotals,
    WeightEntry,
};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Most recent `limit` records of one kind, newest first.
    async fn fetch_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>>;
    async fn insert_activity(&self, user_id: &str, record: &ActivityRecord) -> Result<()>;

    async fn fetch_water(&self, user_id: &str, limit: usize) -> Result<WaterTotals>;
    /// Write the cumulative total for a date (not an increment).
    async fn upsert_water(&self, user_id: &str, date: NaiveDate, total_liters: f64) -> Result<()>;

    async fn fetch_weight(&self, user_id: &str, limit: usize) -> Result<Vec<WeightEntry>>;
    async fn upsert_weight(&self, user_id: &str, entry: &WeightEntry) -> Result<()>;
    async fn delete_weight(&self, user_id: &str, date: NaiveDate) -> Result<()>;

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<()>;
}

/// Tokens returned by the remote auth endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: RemoteUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait RemoteAuth: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<RemoteSession>;
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<RemoteSession>;
    /// Exchange a verified external identity token for a session.
    async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<RemoteSession>;
    /// Confirm a session is still valid and return its user.
    async fn get_user(&self, access_token: &str) -> Result<RemoteUser>;
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

// --- Wire rows ---

/// One row of any activity table. Only the columns of the target table are
/// serialized; every column is optional on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<String>,
}

impl ActivityRow {
    #[must_use]
    pub fn from_record(user_id: &str, record: &ActivityRecord) -> Self {
        let mut row = ActivityRow {
            user_id: Some(user_id.to_string()),
            date: Some(record.date.to_rfc3339()),
            client_uuid: record.uuid,
            ..ActivityRow::default()
        };
        match &record.detail {
            ActivityDetail::Steps { steps } => row.steps = Some(f64::from(*steps)),
            ActivityDetail::Running { distance_km } => row.distance = Some(*distance_km),
            ActivityDetail::Sleep { hours } => row.hours = Some(*hours),
            ActivityDetail::Gym {
                category,
                exercise,
                duration_min,
            } => {
                row.category = Some(category.clone());
                row.exercise_type = Some(exercise.clone());
                row.duration = Some(f64::from(*duration_min));
            }
            ActivityDetail::Food {
                name,
                calories,
                carbs,
                protein,
                fat,
            } => {
                row.food_name = Some(name.clone());
                row.calories = Some(*calories);
                row.carbs = Some(*carbs);
                row.protein = Some(*protein);
                row.fat = Some(*fat);
            }
        }
        row
    }

    /// Convert a fetched row. Rows without a usable timestamp are dropped.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn into_record(self, kind: ActivityKind) -> Option<ActivityRecord> {
        let date = self
            .date
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.created_at.as_deref().and_then(parse_timestamp))?;
        let whole = |v: Option<f64>| v.unwrap_or(0.0).max(0.0).round() as u32;
        let detail = match kind {
            ActivityKind::Steps => ActivityDetail::Steps {
                steps: whole(self.steps),
            },
            ActivityKind::Running => ActivityDetail::Running {
                distance_km: self.distance.unwrap_or(0.0),
            },
            ActivityKind::Sleep => ActivityDetail::Sleep {
                hours: self.hours.unwrap_or(0.0),
            },
            ActivityKind::Gym => ActivityDetail::Gym {
                category: self.category.unwrap_or_default(),
                exercise: self.exercise_type.unwrap_or_default(),
                duration_min: whole(self.duration),
            },
            ActivityKind::Food => ActivityDetail::Food {
                name: self.food_name.unwrap_or_default(),
                calories: self.calories.unwrap_or(0.0),
                carbs: self.carbs.unwrap_or(0.0),
                protein: self.protein.unwrap_or(0.0),
                fat: self.fat.unwrap_or(0.0),
            },
        };
        Some(ActivityRecord {
            uuid: self.client_uuid,
            date,
            detail,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub date: String,
    #[serde(default)]
    pub amount: f64,
}

/// Fold water rows into a per-date map. Later rows for the same date win.
#[must_use]
pub fn water_rows_to_totals(rows: Vec<WaterRow>) -> WaterTotals {
    rows.into_iter()
        .filter_map(|r| parse_day(&r.date).map(|d| (d, r.amount)))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub date: String,
    pub weight: f64,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<String>,
}

impl WeightRow {
    #[must_use]
    pub fn from_entry(user_id: &str, entry: &WeightEntry) -> Self {
        WeightRow {
            user_id: Some(user_id.to_string()),
            date: entry.date.format("%Y-%m-%d").to_string(),
            weight: entry.weight_kg,
            time: entry.time.clone(),
            note: entry.note.clone(),
            created_at: None,
        }
    }

    #[must_use]
    pub fn into_entry(self) -> Option<WeightEntry> {
        let date = parse_day(&self.date)?;
        let recorded_at = self
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| date_to_utc(date));
        Some(WeightEntry {
            date,
            weight_kg: self.weight,
            time: self.time,
            note: self.note,
            recorded_at,
        })
    }
}

/// The remote `users` table. Column names are fixed by the hosted schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub is_google_user: Option<bool>,
    #[serde(default, rename = "nama_lengkap")]
    pub full_name: Option<String>,
    #[serde(default, rename = "jenis_kelamin")]
    pub sex: Option<String>,
    #[serde(default, rename = "tempat_lahir")]
    pub birth_place: Option<String>,
    #[serde(default, rename = "tanggal_lahir")]
    pub birth_date: Option<String>,
    #[serde(default, rename = "golongan_darah")]
    pub blood_type: Option<String>,
    #[serde(default, rename = "tinggi_badan")]
    pub height_cm: Option<f64>,
    #[serde(default, rename = "berat_badan")]
    pub weight_kg: Option<f64>,
    #[serde(default, rename = "nomor_wa")]
    pub phone: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default, rename = "berat_badan_target")]
    pub target_weight_kg: Option<f64>,
    #[serde(default, rename = "has_completed_data")]
    pub profile_completed: Option<bool>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<String>,
}

impl ProfileRow {
    #[must_use]
    pub fn from_profile(p: &UserProfile) -> Self {
        ProfileRow {
            id: p.id.clone(),
            email: Some(p.email.clone()),
            name: p.display_name.clone().or_else(|| p.full_name.clone()),
            picture: p.picture.clone(),
            is_google_user: Some(p.auth_method == AuthMethod::Google),
            full_name: p.full_name.clone(),
            sex: p.sex.map(|s| s.as_wire().to_string()),
            birth_place: p.birth_place.clone(),
            birth_date: p.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            blood_type: p.blood_type.clone(),
            height_cm: p.height_cm,
            weight_kg: p.weight_kg,
            phone: p.phone.clone(),
            goal: p.goal.map(|g| g.as_wire().to_string()),
            target_weight_kg: p.target_weight_kg,
            profile_completed: Some(p.profile_completed),
            created_at: None,
            updated_at: None,
        }
    }

    /// Convert to a profile. Derived metrics are not stored remotely and come back empty.
    #[must_use]
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            email: self.email.unwrap_or_default(),
            auth_method: if self.is_google_user.unwrap_or(false) {
                AuthMethod::Google
            } else {
                AuthMethod::Password
            },
            display_name: self.name,
            full_name: self.full_name,
            picture: self.picture,
            sex: self.sex.and_then(|s| s.parse::<Sex>().ok()),
            birth_place: self.birth_place,
            birth_date: self.birth_date.as_deref().and_then(parse_day),
            blood_type: self.blood_type,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            phone: self.phone,
            goal: self.goal.and_then(|g| g.parse::<Goal>().ok()),
            target_weight_kg: self.target_weight_kg,
            bmr: None,
            tdee: None,
            target_calories: None,
            profile_completed: self.profile_completed.unwrap_or(false),
            created_at: self.created_at,
            updated_at: self.updated_at,
            id: self.id,
        }
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(date_to_utc)
}

fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok()
}
