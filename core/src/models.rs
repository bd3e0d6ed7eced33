use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Liters in one glass of water.
pub const LITERS_PER_GLASS: f64 = 0.25;

// --- Profile ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Reduce,
    Gain,
    Maintain,
}

impl Goal {
    /// Value stored in the remote `users.goal` column.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Goal::Reduce => "turun",
            Goal::Gain => "naik",
            Goal::Maintain => "maintain",
        }
    }
}

impl FromStr for Goal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reduce" | "lose" | "turun" => Ok(Goal::Reduce),
            "gain" | "naik" => Ok(Goal::Gain),
            "maintain" => Ok(Goal::Maintain),
            _ => bail!("Invalid goal '{s}'. Must be one of: reduce, gain, maintain"),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Goal::Reduce => "reduce",
            Goal::Gain => "gain",
            Goal::Maintain => "maintain",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Sex::Male => "laki-laki",
            Sex::Female => "perempuan",
        }
    }
}

impl FromStr for Sex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" | "laki-laki" => Ok(Sex::Male),
            "female" | "f" | "perempuan" => Ok(Sex::Female),
            _ => bail!("Invalid sex '{s}'. Must be 'male' or 'female'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Password,
    Google,
}

/// Cached user profile.
///
/// Everything but `id` and `email` defaults when missing so that profiles
/// written by older clients still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub sex: Option<Sex>,
    #[serde(default)]
    pub birth_place: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub goal: Option<Goal>,
    #[serde(default)]
    pub target_weight_kg: Option<f64>,
    #[serde(default)]
    pub bmr: Option<f64>,
    #[serde(default)]
    pub tdee: Option<f64>,
    #[serde(default)]
    pub target_calories: Option<f64>,
    #[serde(default)]
    pub profile_completed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(&self.email)
    }

    /// Age in whole years on `today`, if a birth date is known.
    #[must_use]
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.birth_date.and_then(|b| today.years_since(b))
    }
}

/// Partial profile update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub sex: Option<Sex>,
    pub birth_place: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub blood_type: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub phone: Option<String>,
    pub goal: Option<Goal>,
    pub target_weight_kg: Option<f64>,
    pub bmr: Option<f64>,
    pub tdee: Option<f64>,
    pub target_calories: Option<f64>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut UserProfile) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { profile.$field = Some(v); })*
            };
        }
        set!(
            full_name,
            sex,
            birth_place,
            birth_date,
            blood_type,
            height_cm,
            weight_kg,
            phone,
            goal,
            target_weight_kg,
            bmr,
            tdee,
            target_calories
        );
        if profile.goal == Some(Goal::Maintain) {
            profile.target_weight_kg = profile.weight_kg;
        }
    }
}

// --- Activity ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Steps,
    Running,
    Sleep,
    Gym,
    Food,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::Steps,
        ActivityKind::Running,
        ActivityKind::Sleep,
        ActivityKind::Gym,
        ActivityKind::Food,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Steps => "steps",
            ActivityKind::Running => "running",
            ActivityKind::Sleep => "sleep",
            ActivityKind::Gym => "gym",
            ActivityKind::Food => "food",
        }
    }

    /// Remote table holding this kind of record.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            ActivityKind::Steps => "steps_activity",
            ActivityKind::Running => "running_activity",
            ActivityKind::Sleep => "sleep_records",
            ActivityKind::Gym => "gym_sessions",
            ActivityKind::Food => "food_intake",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "steps" => Ok(ActivityKind::Steps),
            "running" | "run" => Ok(ActivityKind::Running),
            "sleep" => Ok(ActivityKind::Sleep),
            "gym" => Ok(ActivityKind::Gym),
            "food" => Ok(ActivityKind::Food),
            _ => bail!("Unknown activity kind '{s}'"),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of an activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActivityDetail {
    Steps {
        #[serde(default)]
        steps: u32,
    },
    Running {
        #[serde(default)]
        distance_km: f64,
    },
    Sleep {
        #[serde(default)]
        hours: f64,
    },
    Gym {
        #[serde(default)]
        category: String,
        #[serde(default)]
        exercise: String,
        #[serde(default)]
        duration_min: u32,
    },
    Food {
        #[serde(default)]
        name: String,
        #[serde(default)]
        calories: f64,
        #[serde(default)]
        carbs: f64,
        #[serde(default)]
        protein: f64,
        #[serde(default)]
        fat: f64,
    },
}

impl ActivityDetail {
    #[must_use]
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityDetail::Steps { .. } => ActivityKind::Steps,
            ActivityDetail::Running { .. } => ActivityKind::Running,
            ActivityDetail::Sleep { .. } => ActivityKind::Sleep,
            ActivityDetail::Gym { .. } => ActivityKind::Gym,
            ActivityDetail::Food { .. } => ActivityKind::Food,
        }
    }

    /// The quantity summed by statistics: steps, km, hours, minutes or kcal.
    #[must_use]
    pub fn amount(&self) -> f64 {
        match self {
            ActivityDetail::Steps { steps } => f64::from(*steps),
            ActivityDetail::Running { distance_km } => *distance_km,
            ActivityDetail::Sleep { hours } => *hours,
            ActivityDetail::Gym { duration_min, .. } => f64::from(*duration_min),
            ActivityDetail::Food { calories, .. } => *calories,
        }
    }
}

/// An append-only activity event (steps, run, sleep, gym session or meal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Client-generated idempotency key. Absent on legacy records.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: ActivityDetail,
}

impl ActivityRecord {
    #[must_use]
    pub fn new(detail: ActivityDetail, date: DateTime<Utc>) -> Self {
        Self {
            uuid: Some(Uuid::new_v4()),
            date,
            detail,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActivityKind {
        self.detail.kind()
    }
}

/// Per-date cumulative water intake in liters.
pub type WaterTotals = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaterUnit {
    #[default]
    Liter,
    Glass,
}

impl WaterUnit {
    #[must_use]
    pub fn to_liters(self, amount: f64) -> f64 {
        match self {
            WaterUnit::Liter => amount,
            WaterUnit::Glass => amount * LITERS_PER_GLASS,
        }
    }
}

impl FromStr for WaterUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "l" | "liter" | "liters" | "litre" => Ok(WaterUnit::Liter),
            "glass" | "glasses" | "gelas" => Ok(WaterUnit::Glass),
            _ => bail!("Invalid unit '{s}'. Use 'liter' or 'glass'"),
        }
    }
}

/// Round to two decimal places, the precision water totals are kept at.
#[must_use]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// --- Weight ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub date: NaiveDate,
    pub weight_kg: f64,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub time: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightSummary {
    pub latest_kg: Option<f64>,
    pub total_change_kg: f64,
    pub entries: usize,
    pub avg_change_per_week_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
}

// --- Aggregate ---

/// All locally known activity for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityBundle {
    #[serde(default)]
    pub steps: Vec<ActivityRecord>,
    #[serde(default)]
    pub running: Vec<ActivityRecord>,
    #[serde(default)]
    pub sleep: Vec<ActivityRecord>,
    #[serde(default)]
    pub gym: Vec<ActivityRecord>,
    #[serde(default)]
    pub food: Vec<ActivityRecord>,
    #[serde(default)]
    pub water: WaterTotals,
    #[serde(default)]
    pub weight: Vec<WeightEntry>,
}

impl ActivityBundle {
    #[must_use]
    pub fn records(&self, kind: ActivityKind) -> &[ActivityRecord] {
        match kind {
            ActivityKind::Steps => &self.steps,
            ActivityKind::Running => &self.running,
            ActivityKind::Sleep => &self.sleep,
            ActivityKind::Gym => &self.gym,
            ActivityKind::Food => &self.food,
        }
    }

    pub fn records_mut(&mut self, kind: ActivityKind) -> &mut Vec<ActivityRecord> {
        match kind {
            ActivityKind::Steps => &mut self.steps,
            ActivityKind::Running => &mut self.running,
            ActivityKind::Sleep => &mut self.sleep,
            ActivityKind::Gym => &mut self.gym,
            ActivityKind::Food => &mut self.food,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportData {
    pub user: Option<UserProfile>,
    pub activity: ActivityBundle,
    pub export_date: String,
}

// --- Sync queue ---

/// A remote write waiting to be pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOp {
    InsertActivity { record: ActivityRecord },
    UpsertWater { date: NaiveDate, total_liters: f64 },
    UpsertWeight { entry: WeightEntry },
    DeleteWeight { date: NaiveDate },
    UpsertProfile { profile: Box<UserProfile> },
}

impl SyncOp {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            SyncOp::InsertActivity { record } => format!("insert {}", record.kind()),
            SyncOp::UpsertWater { date, .. } => format!("upsert water {date}"),
            SyncOp::UpsertWeight { entry } => format!("upsert weight {}", entry.date),
            SyncOp::DeleteWeight { date } => format!("delete weight {date}"),
            SyncOp::UpsertProfile { .. } => "upsert profile".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedSyncOp {
    pub id: i64,
    pub user_id: String,
    pub op: SyncOp,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushSummary {
    pub pushed: usize,
    pub failed: usize,
    pub remaining: usize,
}

// --- Validation ---

pub fn validate_steps(steps: i64) -> Result<u32> {
    if steps <= 0 {
        bail!("Steps must be greater than 0");
    }
    u32::try_from(steps).map_err(|_| anyhow::anyhow!("Steps value {steps} is too large"))
}

pub fn validate_distance(km: f64) -> Result<f64> {
    if !km.is_finite() || km <= 0.0 {
        bail!("Distance must be greater than 0 km");
    }
    Ok(km)
}

pub fn validate_sleep(hours: f64) -> Result<f64> {
    if !hours.is_finite() || hours <= 0.0 || hours > 24.0 {
        bail!("Sleep must be more than 0 and at most 24 hours");
    }
    Ok(hours)
}

pub fn validate_gym(category: &str, exercise: &str, duration_min: i64) -> Result<(String, String, u32)> {
    let category = category.trim();
    let exercise = exercise.trim();
    if category.is_empty() {
        bail!("Gym category is required");
    }
    if exercise.is_empty() {
        bail!("Gym exercise is required");
    }
    if duration_min <= 0 {
        bail!("Gym duration must be greater than 0 minutes");
    }
    let duration = u32::try_from(duration_min)
        .map_err(|_| anyhow::anyhow!("Duration {duration_min} is too large"))?;
    Ok((category.to_string(), exercise.to_string(), duration))
}

pub fn validate_food(name: &str, calories: f64, carbs: f64, protein: f64, fat: f64) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Food name is required");
    }
    if !calories.is_finite() || calories <= 0.0 {
        bail!("Calories must be greater than 0");
    }
    for (label, v) in [("Carbs", carbs), ("Protein", protein), ("Fat", fat)] {
        if !v.is_finite() || v < 0.0 {
            bail!("{label} cannot be negative");
        }
    }
    Ok(name.to_string())
}

pub fn validate_water(amount: f64) -> Result<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        bail!("Water amount must be greater than 0");
    }
    Ok(amount)
}

pub fn validate_weight(kg: f64) -> Result<f64> {
    if !kg.is_finite() || !(30.0..=300.0).contains(&kg) {
        bail!("Weight must be between 30 and 300 kg");
    }
    Ok(kg)
}

/// Everything collected by the registration form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub sex: Option<Sex>,
    pub birth_place: String,
    pub birth_date: Option<NaiveDate>,
    pub blood_type: String,
    pub phone: String,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub goal: Option<Goal>,
    pub target_weight_kg: Option<f64>,
}

const BLOOD_TYPES: &[&str] = &["A", "B", "AB", "O"];

#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains(char::is_whitespace)
        && !domain.contains('@')
        && !domain.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Validate a registration and return every problem found, not just the first.
#[must_use]
pub fn validate_registration(reg: &Registration, today: NaiveDate) -> Vec<String> {
    let mut errors = Vec::new();

    if !is_valid_email(reg.email.trim()) {
        errors.push("Email address is not valid".to_string());
    }
    if reg.password.chars().count() < 6 {
        errors.push("Password must be at least 6 characters".to_string());
    }
    if reg.password != reg.confirm_password {
        errors.push("Password confirmation does not match".to_string());
    }
    errors.extend(profile_errors(
        &ProfileFields {
            full_name: &reg.full_name,
            sex: reg.sex,
            birth_place: &reg.birth_place,
            birth_date: reg.birth_date,
            blood_type: &reg.blood_type,
            phone: &reg.phone,
            height_cm: reg.height_cm,
            weight_kg: reg.weight_kg,
            goal: reg.goal,
            target_weight_kg: reg.target_weight_kg,
        },
        today,
    ));
    errors
}

/// Validate the profile completion form shown after a first Google sign-in.
#[must_use]
pub fn validate_profile(profile: &UserProfile, today: NaiveDate) -> Vec<String> {
    profile_errors(
        &ProfileFields {
            full_name: profile.full_name.as_deref().unwrap_or_default(),
            sex: profile.sex,
            birth_place: profile.birth_place.as_deref().unwrap_or_default(),
            birth_date: profile.birth_date,
            blood_type: profile.blood_type.as_deref().unwrap_or_default(),
            phone: profile.phone.as_deref().unwrap_or_default(),
            height_cm: profile.height_cm,
            weight_kg: profile.weight_kg,
            goal: profile.goal,
            target_weight_kg: profile.target_weight_kg,
        },
        today,
    )
}

struct ProfileFields<'a> {
    full_name: &'a str,
    sex: Option<Sex>,
    birth_place: &'a str,
    birth_date: Option<NaiveDate>,
    blood_type: &'a str,
    phone: &'a str,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    goal: Option<Goal>,
    target_weight_kg: Option<f64>,
}

fn profile_errors(p: &ProfileFields<'_>, today: NaiveDate) -> Vec<String> {
    let mut errors = Vec::new();

    if p.full_name.trim().is_empty() {
        errors.push("Full name is required".to_string());
    }
    if p.sex.is_none() {
        errors.push("Sex is required".to_string());
    }
    if p.birth_place.trim().is_empty() {
        errors.push("Birth place is required".to_string());
    }
    match p.birth_date.map(|b| today.years_since(b)) {
        None => errors.push("Birth date is required".to_string()),
        Some(Some(age)) if (10..=120).contains(&age) => {}
        Some(_) => errors.push("Age must be between 10 and 120 years".to_string()),
    }
    if !BLOOD_TYPES.contains(&p.blood_type.trim().to_uppercase().as_str()) {
        errors.push("Blood type must be one of A, B, AB, O".to_string());
    }
    if p.phone.trim().chars().count() < 10 {
        errors.push("Phone number must be at least 10 characters".to_string());
    }
    if !p.height_cm.is_some_and(|h| (100.0..=250.0).contains(&h)) {
        errors.push("Height must be between 100 and 250 cm".to_string());
    }
    let weight_ok = p.weight_kg.is_some_and(|w| (30.0..=300.0).contains(&w));
    if !weight_ok {
        errors.push("Weight must be between 30 and 300 kg".to_string());
    }

    match p.goal {
        None => errors.push("Goal is required".to_string()),
        Some(Goal::Maintain) => {}
        Some(goal) => match p.target_weight_kg {
            None => errors.push("Target weight is required".to_string()),
            Some(target) if !(30.0..=300.0).contains(&target) => {
                errors.push("Target weight must be between 30 and 300 kg".to_string());
            }
            Some(target) => {
                if let (true, Some(current)) = (weight_ok, p.weight_kg) {
                    if goal == Goal::Reduce && target >= current {
                        errors.push(
                            "Target weight must be lower than current weight to reduce".to_string(),
                        );
                    }
                    if goal == Goal::Gain && target <= current {
                        errors.push(
                            "Target weight must be higher than current weight to gain".to_string(),
                        );
                    }
                    if (target - current).abs() > 50.0 {
                        errors.push(
                            "Target weight must be within 50 kg of current weight".to_string(),
                        );
                    }
                }
            }
        },
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_registration() -> Registration {
        Registration {
            email: "sari@example.com".to_string(),
            password: "rahasia1".to_string(),
            confirm_password: "rahasia1".to_string(),
            full_name: "Sari Wulandari".to_string(),
            sex: Some(Sex::Female),
            birth_place: "Bandung".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1995, 4, 12),
            blood_type: "o".to_string(),
            phone: "081234567890".to_string(),
            height_cm: Some(160.0),
            weight_kg: Some(65.0),
            goal: Some(Goal::Reduce),
            target_weight_kg: Some(58.0),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(validate_registration(&valid_registration(), today()).is_empty());
    }

    #[test]
    fn test_registration_collects_all_errors() {
        let reg = Registration {
            email: "nope".to_string(),
            password: "abc".to_string(),
            confirm_password: "abd".to_string(),
            ..Registration::default()
        };
        let errors = validate_registration(&reg, today());
        assert!(errors.iter().any(|e| e.contains("Email")));
        assert!(errors.iter().any(|e| e.contains("at least 6")));
        assert!(errors.iter().any(|e| e.contains("does not match")));
        assert!(errors.iter().any(|e| e.contains("Goal is required")));
        assert!(errors.len() >= 10);
    }

    #[test]
    fn test_registration_age_bounds() {
        let mut reg = valid_registration();
        reg.birth_date = NaiveDate::from_ymd_opt(2020, 1, 1);
        let errors = validate_registration(&reg, today());
        assert_eq!(errors, vec!["Age must be between 10 and 120 years"]);
    }

    #[test]
    fn test_registration_goal_direction() {
        let mut reg = valid_registration();
        reg.target_weight_kg = Some(70.0);
        let errors = validate_registration(&reg, today());
        assert!(errors[0].contains("lower than current"));

        reg.goal = Some(Goal::Gain);
        assert!(validate_registration(&reg, today()).is_empty());

        reg.target_weight_kg = Some(120.0);
        let errors = validate_registration(&reg, today());
        assert!(errors[0].contains("within 50 kg"));
    }

    #[test]
    fn test_registration_maintain_needs_no_target() {
        let mut reg = valid_registration();
        reg.goal = Some(Goal::Maintain);
        reg.target_weight_kg = None;
        assert!(validate_registration(&reg, today()).is_empty());
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@@b.co"));
    }

    #[test]
    fn test_activity_validation() {
        assert_eq!(validate_steps(5000).unwrap(), 5000);
        assert!(validate_steps(0).is_err());
        assert!(validate_distance(0.0).is_err());
        assert!(validate_sleep(24.0).is_ok());
        assert!(validate_sleep(24.5).is_err());
        assert!(validate_sleep(0.0).is_err());
        assert!(validate_gym("Cardio", "", 30).is_err());
        assert!(validate_gym("Cardio", "Treadmill", 0).is_err());
        assert!(validate_food("Nasi goreng", 0.0, 0.0, 0.0, 0.0).is_err());
        assert!(validate_food("Nasi goreng", 450.0, 60.0, 12.0, -1.0).is_err());
        assert!(validate_weight(29.9).is_err());
        assert!(validate_weight(300.0).is_ok());
    }

    #[test]
    fn test_goal_parse_and_wire() {
        assert_eq!("turun".parse::<Goal>().unwrap(), Goal::Reduce);
        assert_eq!("Gain".parse::<Goal>().unwrap(), Goal::Gain);
        assert_eq!(Goal::Gain.as_wire(), "naik");
        assert!("bulk".parse::<Goal>().is_err());
    }

    #[test]
    fn test_water_unit_glass() {
        let unit: WaterUnit = "glass".parse().unwrap();
        assert!((unit.to_liters(1.0) - 0.25).abs() < f64::EPSILON);
        assert!((round2(0.1 + 0.2) - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_tolerates_missing_fields() {
        let p: UserProfile =
            serde_json::from_str(r#"{"id":"u1","email":"a@b.co","height_cm":170}"#).unwrap();
        assert_eq!(p.auth_method, AuthMethod::Password);
        assert_eq!(p.height_cm, Some(170.0));
        assert!(p.goal.is_none());
        assert_eq!(p.name(), "a@b.co");
    }

    #[test]
    fn test_profile_update_maintain_pins_target() {
        let mut p = UserProfile {
            id: "u1".to_string(),
            weight_kg: Some(72.0),
            target_weight_kg: Some(65.0),
            ..UserProfile::default()
        };
        ProfileUpdate {
            goal: Some(Goal::Maintain),
            ..ProfileUpdate::default()
        }
        .apply(&mut p);
        assert_eq!(p.target_weight_kg, Some(72.0));
    }

    #[test]
    fn test_activity_record_serde_flattened() {
        let rec = ActivityRecord::new(
            ActivityDetail::Gym {
                category: "Strength".to_string(),
                exercise: "Squat".to_string(),
                duration_min: 45,
            },
            Utc::now(),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["kind"], "gym");
        assert_eq!(json["duration_min"], 45);
        let back: ActivityRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }
}
