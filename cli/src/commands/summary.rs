use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use calori_core::models::ActivityKind;
use calori_core::service::Tracker;
use calori_core::stats::{self, MAX_STREAK_DAYS};

use super::helpers::{no_neg_zero, or_dash, parse_date, print_json};

pub(crate) fn cmd_summary(tracker: &Tracker, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, tracker.today())?;
    let overview = tracker.overview(Some(date))?;

    if json {
        return print_json(&overview);
    }

    let day = &overview.today;
    println!("=== {} ===\n", day.date.format("%Y-%m-%d"));
    println!("  Steps:    {}", day.steps);
    println!("  Running:  {:.2} km", day.running_km);
    println!(
        "  Gym:      {} session(s), {} min",
        day.gym_sessions, day.gym_minutes
    );
    println!(
        "  Food:     {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        day.calories_in, day.protein_g, day.carbs_g, day.fat_g
    );
    println!("  Water:    {:.2} L", day.water_liters);
    println!(
        "  Sleep:    {}",
        or_dash(overview.last_sleep_hours.map(|h| format!("{h:.1} h (last logged)")))
    );
    println!();
    println!(
        "  Weekly step goal: {:.0}%",
        no_neg_zero(overview.weekly_step_progress_pct)
    );
    println!(
        "  Streak:           {} day(s) (max {MAX_STREAK_DAYS})",
        overview.streak_days
    );
    println!(
        "  Gym this month:   {} session(s)",
        overview.monthly_gym_sessions
    );
    println!();

    #[derive(Tabled)]
    struct PeriodRow {
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "7d total")]
        week: String,
        #[tabled(rename = "7d avg")]
        week_avg: String,
        #[tabled(rename = "30d total")]
        month: String,
        #[tabled(rename = "90d total")]
        quarter: String,
    }

    let rows: Vec<PeriodRow> = overview
        .periods
        .iter()
        .map(|p| PeriodRow {
            kind: p.kind.clone(),
            week: format!("{:.1}", no_neg_zero(p.week.total)),
            week_avg: format!("{:.1}", no_neg_zero(p.week.average)),
            month: format!("{:.1}", no_neg_zero(p.month.total)),
            quarter: format!("{:.1}", no_neg_zero(p.quarter.total)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_history(tracker: &Tracker, kind: ActivityKind, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Total")]
        total: String,
    }

    let bundle = tracker.bundle()?;
    let series = stats::daily_series(
        bundle.records(kind),
        tracker.day_boundary(),
        tracker.today(),
        days,
    );

    if json {
        let days: Vec<_> = series
            .iter()
            .map(|(date, total)| serde_json::json!({ "date": date, "total": total }))
            .collect();
        return print_json(&days);
    }

    if series.iter().all(|(_, total)| *total <= 0.0) {
        eprintln!("No {kind} entries in the last {days} days");
        return Ok(());
    }

    let rows: Vec<HistoryRow> = series
        .iter()
        .map(|(date, total)| HistoryRow {
            date: date.format("%Y-%m-%d").to_string(),
            total: match kind {
                ActivityKind::Running | ActivityKind::Sleep => format!("{total:.1}"),
                _ => format!("{total:.0}"),
            },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
