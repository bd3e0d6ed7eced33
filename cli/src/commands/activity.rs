use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use calori_core::models::{ActivityDetail, ActivityKind, ActivityRecord};
use calori_core::service::Tracker;
use calori_core::stats::DayBoundary;

use super::helpers::{parse_at, print_json, truncate};
use super::sync::push_pending;

/// One-line description of an entry, without its timestamp.
pub(crate) fn describe(detail: &ActivityDetail) -> String {
    match detail {
        ActivityDetail::Steps { steps } => format!("{steps} steps"),
        ActivityDetail::Running { distance_km } => format!("{distance_km:.2} km run"),
        ActivityDetail::Sleep { hours } => format!("{hours:.1} h sleep"),
        ActivityDetail::Gym {
            category,
            exercise,
            duration_min,
        } => format!("{exercise} ({category}), {duration_min} min"),
        ActivityDetail::Food {
            name,
            calories,
            carbs,
            protein,
            fat,
        } => format!("{name}: {calories:.0} kcal | P:{protein:.0}g C:{carbs:.0}g F:{fat:.0}g"),
    }
}

fn local_time(record: &ActivityRecord, boundary: DayBoundary) -> String {
    match boundary {
        DayBoundary::Local => record
            .date
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        DayBoundary::Fixed(offset) => record
            .date
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
    }
}

async fn finish(tracker: &Tracker, record: &ActivityRecord, json: bool) -> Result<()> {
    push_pending(tracker).await?;
    if json {
        print_json(record)
    } else {
        println!(
            "Logged {} at {}",
            describe(&record.detail),
            local_time(record, tracker.day_boundary())
        );
        Ok(())
    }
}

pub(crate) async fn cmd_add_steps(
    tracker: &Tracker,
    steps: i64,
    at: Option<String>,
    json: bool,
) -> Result<()> {
    let record = tracker.add_steps(steps, parse_at(at, tracker.day_boundary())?)?;
    finish(tracker, &record, json).await
}

pub(crate) async fn cmd_add_run(
    tracker: &Tracker,
    distance_km: f64,
    at: Option<String>,
    json: bool,
) -> Result<()> {
    let record = tracker.add_running(distance_km, parse_at(at, tracker.day_boundary())?)?;
    finish(tracker, &record, json).await
}

pub(crate) async fn cmd_add_sleep(
    tracker: &Tracker,
    hours: f64,
    at: Option<String>,
    json: bool,
) -> Result<()> {
    let record = tracker.add_sleep(hours, parse_at(at, tracker.day_boundary())?)?;
    finish(tracker, &record, json).await
}

pub(crate) async fn cmd_add_gym(
    tracker: &Tracker,
    category: &str,
    exercise: &str,
    minutes: i64,
    at: Option<String>,
    json: bool,
) -> Result<()> {
    let record = tracker.add_gym(
        category,
        exercise,
        minutes,
        parse_at(at, tracker.day_boundary())?,
    )?;
    finish(tracker, &record, json).await
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn cmd_add_food(
    tracker: &Tracker,
    name: &str,
    calories: f64,
    carbs: f64,
    protein: f64,
    fat: f64,
    at: Option<String>,
    json: bool,
) -> Result<()> {
    let record = tracker.add_food(
        name,
        calories,
        carbs,
        protein,
        fat,
        parse_at(at, tracker.day_boundary())?,
    )?;
    finish(tracker, &record, json).await
}

pub(crate) fn cmd_list(tracker: &Tracker, kind: ActivityKind, limit: usize, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Entry")]
        entry: String,
    }

    let mut records = tracker.list_activity(kind)?;
    records.truncate(limit);

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        eprintln!("No {kind} entries yet. Use `calori add {kind}` to log one.");
        return Ok(());
    }

    let boundary = tracker.day_boundary();
    let rows: Vec<EntryRow> = records
        .iter()
        .map(|r| EntryRow {
            when: local_time(r, boundary),
            amount: match kind {
                ActivityKind::Steps => format!("{:.0}", r.detail.amount()),
                ActivityKind::Running => format!("{:.2} km", r.detail.amount()),
                ActivityKind::Sleep => format!("{:.1} h", r.detail.amount()),
                ActivityKind::Gym => format!("{:.0} min", r.detail.amount()),
                ActivityKind::Food => format!("{:.0} kcal", r.detail.amount()),
            },
            entry: truncate(&describe(&r.detail), 50),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(describe(&ActivityDetail::Steps { steps: 4200 }), "4200 steps");
        assert_eq!(
            describe(&ActivityDetail::Gym {
                category: "Strength".into(),
                exercise: "Squat".into(),
                duration_min: 30,
            }),
            "Squat (Strength), 30 min"
        );
        assert_eq!(
            describe(&ActivityDetail::Food {
                name: "Soto ayam".into(),
                calories: 312.4,
                carbs: 20.0,
                protein: 25.2,
                fat: 14.0,
            }),
            "Soto ayam: 312 kcal | P:25g C:20g F:14g"
        );
    }
}
