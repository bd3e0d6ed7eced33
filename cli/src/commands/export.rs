use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use calori_core::service::Tracker;

pub(crate) fn cmd_export_json(tracker: &Tracker, output: Option<&Path>) -> Result<()> {
    let data = tracker.export()?;
    let text = serde_json::to_string_pretty(&data)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

pub(crate) fn cmd_export_csv(tracker: &Tracker, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let count = tracker.export_weight_csv(BufWriter::new(file))?;
            eprintln!("Exported {count} weight entries to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            tracker.export_weight_csv(&mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calori_core::models::{Goal, NewWeightEntry, Registration, Sex};
    use chrono::NaiveDate;

    async fn tracker_with_weight() -> Tracker {
        let tracker = Tracker::new_in_memory().unwrap();
        tracker
            .register(&Registration {
                email: "tono@example.com".to_string(),
                password: "secret1".to_string(),
                confirm_password: "secret1".to_string(),
                full_name: "Tono".to_string(),
                sex: Some(Sex::Male),
                birth_place: "Medan".to_string(),
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1),
                blood_type: "B".to_string(),
                phone: "081200001111".to_string(),
                height_cm: Some(170.0),
                weight_kg: Some(72.0),
                goal: Some(Goal::Maintain),
                target_weight_kg: None,
            })
            .await
            .unwrap();
        for (d, kg) in [(1, 72.0), (2, 71.5)] {
            tracker
                .log_weight(&NewWeightEntry {
                    date: NaiveDate::from_ymd_opt(2024, 8, d).unwrap(),
                    weight_kg: kg,
                    time: None,
                    note: None,
                })
                .unwrap();
        }
        tracker
    }

    #[tokio::test]
    async fn test_export_files() {
        let tracker = tracker_with_weight().await;
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("export.json");
        cmd_export_json(&tracker, Some(&json_path)).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["user"]["email"], "tono@example.com");
        assert_eq!(value["activity"]["weight"].as_array().unwrap().len(), 2);

        let csv_path = dir.path().join("weight.csv");
        cmd_export_csv(&tracker, Some(&csv_path)).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Weight (kg),Change (kg),Note");
        assert_eq!(lines[1], "2024-08-02,71.5,-0.5,");
        assert_eq!(lines[2], "2024-08-01,72,0,");
    }
}
