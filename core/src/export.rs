use std::io::Write;

use anyhow::Result;
use chrono::Utc;

use crate::models::{ActivityBundle, ExportData, UserProfile, WeightEntry};

#[must_use]
pub fn export_data(user: Option<UserProfile>, activity: ActivityBundle) -> ExportData {
    ExportData {
        user,
        activity,
        export_date: Utc::now().to_rfc3339(),
    }
}

/// Whole numbers without decimals, anything else with one.
#[must_use]
pub fn format_weight(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

/// Write weight history as CSV, newest first, with the change from the previous entry.
pub fn write_weight_csv<W: Write>(entries: &[WeightEntry], out: W) -> Result<()> {
    let mut sorted: Vec<&WeightEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["Date", "Weight (kg)", "Change (kg)", "Note"])?;
    for (i, entry) in sorted.iter().enumerate() {
        let change = sorted
            .get(i + 1)
            .map_or_else(|| "0".to_string(), |older| format_weight(entry.weight_kg - older.weight_kg));
        wtr.write_record([
            entry.date.format("%Y-%m-%d").to_string(),
            format_weight(entry.weight_kg),
            change,
            entry.note.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(d: u32, kg: f64, note: Option<&str>) -> WeightEntry {
        let date = NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        WeightEntry {
            date,
            weight_kg: kg,
            time: None,
            note: note.map(str::to_string),
            recorded_at: crate::db::date_to_utc(date),
        }
    }

    #[test]
    fn test_format_weight() {
        assert_eq!(format_weight(70.0), "70");
        assert_eq!(format_weight(69.46), "69.5");
        assert_eq!(format_weight(-0.600_000_000_000_001_4), "-0.6");
        assert_eq!(format_weight(1.0), "1");
        assert_eq!(format_weight(-0.04), "0");
    }

    #[test]
    fn test_weight_csv() {
        let entries = vec![
            entry(1, 70.0, None),
            entry(3, 69.4, Some("after run, tired")),
            entry(2, 70.0, Some("ok")),
        ];
        let mut buf = Vec::new();
        write_weight_csv(&entries, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date,Weight (kg),Change (kg),Note");
        assert_eq!(lines[1], "2024-03-03,69.4,-0.6,\"after run, tired\"");
        assert_eq!(lines[2], "2024-03-02,70,0,ok");
        assert_eq!(lines[3], "2024-03-01,70,0,");
    }

    #[test]
    fn test_export_data_serializes() {
        let data = export_data(None, ActivityBundle::default());
        let json = serde_json::to_value(&data).unwrap();
        assert!(json["user"].is_null());
        assert!(json["activity"]["steps"].as_array().unwrap().is_empty());
        assert!(json["export_date"].as_str().is_some());
    }
}
