use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::{
    ActivityBundle, ActivityDetail, ActivityKind, ActivityRecord, WaterTotals, WeightEntry,
    WeightSummary,
};

/// Weekly step goal used for progress reporting.
pub const WEEKLY_STEP_GOAL: f64 = 70_000.0;
/// Streaks look back at most this many days.
pub const MAX_STREAK_DAYS: u32 = 30;

/// Which calendar day a timestamp belongs to.
///
/// Records are stamped with the client clock, so "today" is only as exact as
/// the boundary chosen here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DayBoundary {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Boundary at a fixed offset from UTC, in minutes.
    #[must_use]
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes * 60).map(DayBoundary::Fixed)
    }

    #[must_use]
    pub fn day_of(self, ts: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Local => ts.with_timezone(&Local).date_naive(),
            DayBoundary::Fixed(offset) => ts.with_timezone(&offset).date_naive(),
        }
    }

    #[must_use]
    pub fn today(self) -> NaiveDate {
        self.day_of(Utc::now())
    }

    /// Interpret a wall-clock time on this boundary. `None` for times skipped
    /// or repeated by a local clock change.
    #[must_use]
    pub fn to_utc(self, wall: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            DayBoundary::Local => Local
                .from_local_datetime(&wall)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
            DayBoundary::Fixed(offset) => offset
                .from_local_datetime(&wall)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayTotals {
    pub date: NaiveDate,
    pub steps: u64,
    pub running_km: f64,
    pub gym_minutes: u64,
    pub gym_sessions: usize,
    pub calories_in: f64,
    pub carbs_g: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub water_liters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f64>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn day_totals(bundle: &ActivityBundle, boundary: DayBoundary, date: NaiveDate) -> DayTotals {
    let on_day = |r: &&ActivityRecord| boundary.day_of(r.date) == date;
    let mut totals = DayTotals {
        date,
        water_liters: bundle.water.get(&date).copied().unwrap_or(0.0),
        ..DayTotals::default()
    };

    for r in bundle.steps.iter().filter(on_day) {
        totals.steps += r.detail.amount() as u64;
    }
    totals.running_km = bundle.running.iter().filter(on_day).map(|r| r.detail.amount()).sum();
    for r in bundle.gym.iter().filter(on_day) {
        totals.gym_minutes += r.detail.amount() as u64;
        totals.gym_sessions += 1;
    }
    for r in bundle.food.iter().filter(on_day) {
        if let ActivityDetail::Food {
            calories,
            carbs,
            protein,
            fat,
            ..
        } = &r.detail
        {
            totals.calories_in += calories;
            totals.carbs_g += carbs;
            totals.protein_g += protein;
            totals.fat_g += fat;
        }
    }
    totals.sleep_hours = bundle
        .sleep
        .iter()
        .filter(on_day)
        .max_by_key(|r| r.date)
        .map(|r| r.detail.amount());
    totals
}

/// Sum and per-entry average over the `days` calendar days ending on `today`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub days: u32,
    pub entries: usize,
    pub total: f64,
    pub average: f64,
}

impl PeriodTotals {
    #[allow(clippy::cast_precision_loss)]
    fn from_values(days: u32, values: impl Iterator<Item = f64>) -> Self {
        let (entries, total) = values.fold((0usize, 0.0), |(n, sum), v| (n + 1, sum + v));
        let average = if entries == 0 {
            0.0
        } else {
            total / entries as f64
        };
        Self {
            days,
            entries,
            total,
            average,
        }
    }
}

fn in_window(day: NaiveDate, today: NaiveDate, days: u32) -> bool {
    let age = (today - day).num_days();
    age >= 0 && age < i64::from(days)
}

#[must_use]
pub fn period_totals(
    records: &[ActivityRecord],
    boundary: DayBoundary,
    today: NaiveDate,
    days: u32,
) -> PeriodTotals {
    PeriodTotals::from_values(
        days,
        records
            .iter()
            .filter(|r| in_window(boundary.day_of(r.date), today, days))
            .map(|r| r.detail.amount()),
    )
}

#[must_use]
pub fn water_period_totals(water: &WaterTotals, today: NaiveDate, days: u32) -> PeriodTotals {
    PeriodTotals::from_values(
        days,
        water
            .iter()
            .filter(|(d, _)| in_window(**d, today, days))
            .map(|(_, v)| *v),
    )
}

/// Per-day sums for the `days` days ending on `today`, oldest first.
#[must_use]
pub fn daily_series(
    records: &[ActivityRecord],
    boundary: DayBoundary,
    today: NaiveDate,
    days: u32,
) -> Vec<(NaiveDate, f64)> {
    (0..i64::from(days))
        .rev()
        .map(|back| {
            let day = today - chrono::Duration::days(back);
            let sum = records
                .iter()
                .filter(|r| boundary.day_of(r.date) == day)
                .map(|r| r.detail.amount())
                .sum();
            (day, sum)
        })
        .collect()
}

/// Consecutive days ending today with any steps, running or water logged.
#[must_use]
pub fn streak_days(bundle: &ActivityBundle, boundary: DayBoundary, today: NaiveDate) -> u32 {
    let active = |day: NaiveDate| {
        let logged = |records: &[ActivityRecord]| {
            records
                .iter()
                .any(|r| r.detail.amount() > 0.0 && boundary.day_of(r.date) == day)
        };
        logged(&bundle.steps)
            || logged(&bundle.running)
            || bundle.water.get(&day).is_some_and(|v| *v > 0.0)
    };

    let mut streak = 0;
    for back in 0..MAX_STREAK_DAYS {
        if !active(today - chrono::Duration::days(i64::from(back))) {
            break;
        }
        streak += 1;
    }
    streak
}

/// Percent of the weekly step goal reached over the last seven days, capped at 100.
#[must_use]
pub fn weekly_step_progress(bundle: &ActivityBundle, boundary: DayBoundary, today: NaiveDate) -> f64 {
    let week = period_totals(&bundle.steps, boundary, today, 7);
    (week.total / WEEKLY_STEP_GOAL * 100.0).min(100.0)
}

/// Gym sessions in the calendar month containing `today`.
#[must_use]
pub fn monthly_gym_sessions(bundle: &ActivityBundle, boundary: DayBoundary, today: NaiveDate) -> usize {
    bundle
        .gym
        .iter()
        .map(|r| boundary.day_of(r.date))
        .filter(|d| d.year() == today.year() && d.month() == today.month())
        .count()
}

#[must_use]
pub fn last_sleep(bundle: &ActivityBundle) -> Option<&ActivityRecord> {
    bundle.sleep.iter().max_by_key(|r| r.date)
}

/// Summarize a weight history. `entries` may be in any order.
///
/// Progress runs from `start_kg` (the profile weight, or the first entry when
/// the profile has none) toward `target_kg`, which defaults to the start.
#[must_use]
pub fn weight_summary(
    entries: &[WeightEntry],
    start_kg: Option<f64>,
    target_kg: Option<f64>,
) -> WeightSummary {
    let mut sorted: Vec<&WeightEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.date);

    let (Some(first), Some(latest)) = (sorted.first(), sorted.last()) else {
        return WeightSummary {
            latest_kg: None,
            total_change_kg: 0.0,
            entries: 0,
            avg_change_per_week_kg: 0.0,
            target_kg: target_kg.or(start_kg),
            progress_pct: None,
        };
    };

    let total_change = latest.weight_kg - first.weight_kg;
    #[allow(clippy::cast_precision_loss)]
    let weeks = (latest.date - first.date).num_days() as f64 / 7.0;
    let avg_change_per_week = if weeks > 0.0 { total_change / weeks } else { 0.0 };

    let start = start_kg.unwrap_or(first.weight_kg);
    let target = target_kg.unwrap_or(start);
    let needed = target - start;
    // Nothing to change means nothing achieved yet.
    let progress_pct = if needed.abs() < f64::EPSILON {
        0.0
    } else {
        ((latest.weight_kg - start) / needed * 100.0).clamp(0.0, 100.0)
    };

    WeightSummary {
        latest_kg: Some(latest.weight_kg),
        total_change_kg: total_change,
        entries: sorted.len(),
        avg_change_per_week_kg: avg_change_per_week,
        target_kg: Some(target),
        progress_pct: Some(progress_pct),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KindPeriods {
    pub kind: String,
    pub week: PeriodTotals,
    pub month: PeriodTotals,
    pub quarter: PeriodTotals,
}

/// Everything the dashboard summary shows.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub today: DayTotals,
    pub weekly_step_progress_pct: f64,
    pub streak_days: u32,
    pub monthly_gym_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sleep_hours: Option<f64>,
    pub periods: Vec<KindPeriods>,
}

#[must_use]
pub fn overview(bundle: &ActivityBundle, boundary: DayBoundary, today: NaiveDate) -> Overview {
    let mut periods: Vec<KindPeriods> = ActivityKind::ALL
        .into_iter()
        .map(|kind| {
            let records = bundle.records(kind);
            KindPeriods {
                kind: kind.to_string(),
                week: period_totals(records, boundary, today, 7),
                month: period_totals(records, boundary, today, 30),
                quarter: period_totals(records, boundary, today, 90),
            }
        })
        .collect();
    periods.push(KindPeriods {
        kind: "water".to_string(),
        week: water_period_totals(&bundle.water, today, 7),
        month: water_period_totals(&bundle.water, today, 30),
        quarter: water_period_totals(&bundle.water, today, 90),
    });

    Overview {
        today: day_totals(bundle, boundary, today),
        weekly_step_progress_pct: weekly_step_progress(bundle, boundary, today),
        streak_days: streak_days(bundle, boundary, today),
        monthly_gym_sessions: monthly_gym_sessions(bundle, boundary, today),
        last_sleep_hours: last_sleep(bundle).map(|r| r.detail.amount()),
        periods,
    }
}
