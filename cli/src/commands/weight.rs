use anyhow::{Context, Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use calori_core::export::format_weight;
use calori_core::models::{NewWeightEntry, WeightEntry};
use calori_core::service::Tracker;

use super::helpers::{no_neg_zero, or_dash, parse_date, print_json};
use super::sync::push_pending;

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

fn to_kg(value: f64, unit: &str) -> Result<f64> {
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => {
            let kg = no_neg_zero(value * KG_PER_LB);
            eprintln!("Converting {value:.1} lbs → {kg:.2} kg");
            Ok(kg)
        }
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

fn validate_time(time: Option<String>) -> Result<Option<String>> {
    time.map(|t| {
        chrono::NaiveTime::parse_from_str(t.trim(), "%H:%M")
            .map(|parsed| parsed.format("%H:%M").to_string())
            .with_context(|| format!("Invalid time '{t}'. Use HH:MM"))
    })
    .transpose()
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn cmd_weight_log(
    tracker: &Tracker,
    value: f64,
    unit: &str,
    date: Option<String>,
    time: Option<String>,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let entry = NewWeightEntry {
        date: parse_date(date, tracker.today())?,
        weight_kg: to_kg(value, unit)?,
        time: validate_time(time)?,
        note: note.filter(|n| !n.trim().is_empty()),
    };

    let result = tracker.log_weight(&entry)?;
    push_pending(tracker).await?;

    if json {
        return print_json(&result);
    }
    print!("Logged ");
    print_entry(&result);
    Ok(())
}

fn print_entry(entry: &WeightEntry) {
    let at = entry
        .time
        .as_deref()
        .map_or_else(String::new, |t| format!(" {t}"));
    println!(
        "{}{at}: {:.1} kg ({:.1} lbs)",
        entry.date.format("%Y-%m-%d"),
        entry.weight_kg,
        entry.weight_kg * LBS_PER_KG
    );
    if let Some(note) = &entry.note {
        println!("  Note: {note}");
    }
}

pub(crate) fn cmd_weight_show(tracker: &Tracker, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, tracker.today())?;
    let entry = tracker.get_weight(date)?;
    match (entry, json) {
        (entry, true) => print_json(&entry),
        (Some(e), false) => {
            print_entry(&e);
            Ok(())
        }
        (None, false) => {
            eprintln!("Nothing logged for {}", date.format("%Y-%m-%d"));
            Ok(())
        }
    }
}

pub(crate) fn cmd_weight_history(tracker: &Tracker, limit: Option<u32>, json: bool) -> Result<()> {
    let entries = tracker.weight_history(limit.map(i64::from))?;

    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `calori weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Time")]
            time: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Change (kg)")]
            change: String,
            #[tabled(rename = "Note")]
            note: String,
        }

        let rows: Vec<WeightRow> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| WeightRow {
                date: e.date.format("%Y-%m-%d").to_string(),
                time: or_dash(e.time.as_deref()),
                kg: format!("{:.1}", e.weight_kg),
                change: entries
                    .get(i + 1)
                    .map_or_else(|| "-".to_string(), |older| {
                        format_weight(e.weight_kg - older.weight_kg)
                    }),
                note: e.note.clone().unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) async fn cmd_weight_delete(tracker: &Tracker, date: String, json: bool) -> Result<()> {
    let date = parse_date(Some(date), tracker.today())?;
    tracker.delete_weight(date)?;
    push_pending(tracker).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": date }));
    } else {
        println!("Deleted weight entry for {}", date.format("%Y-%m-%d"));
    }

    Ok(())
}

pub(crate) fn cmd_weight_summary(tracker: &Tracker, json: bool) -> Result<()> {
    let summary = tracker.weight_summary()?;
    if json {
        return print_json(&summary);
    }
    let Some(latest) = summary.latest_kg else {
        eprintln!("No weight entries found. Use `calori weight log` to record your weight.");
        return Ok(());
    };

    println!("  Latest:        {latest:.1} kg");
    println!(
        "  Total change:  {} kg over {} entries",
        format_weight(summary.total_change_kg),
        summary.entries
    );
    println!(
        "  Weekly trend:  {:.2} kg/week",
        no_neg_zero(summary.avg_change_per_week_kg)
    );
    if let Some(target) = summary.target_kg {
        println!("  Target:        {target:.1} kg");
    }
    if let Some(pct) = summary.progress_pct {
        println!("  Progress:      {pct:.0}%");
    }
    Ok(())
}
