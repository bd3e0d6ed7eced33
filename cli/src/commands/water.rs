use anyhow::Result;

use calori_core::models::WaterUnit;
use calori_core::service::Tracker;

use super::helpers::parse_date;
use super::sync::push_pending;

pub(crate) async fn cmd_water_add(
    tracker: &Tracker,
    amount: f64,
    unit: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let unit: WaterUnit = unit.parse()?;
    let date = parse_date(date, tracker.today())?;
    let total = tracker.add_water(amount, unit, Some(date))?;
    push_pending(tracker).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "total_liters": total })
        );
    } else {
        println!("Water on {}: {total:.2} L", date.format("%Y-%m-%d"));
    }
    Ok(())
}

pub(crate) fn cmd_water_show(tracker: &Tracker, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date, tracker.today())?;
    let total = tracker.water_for(date)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "total_liters": total })
        );
    } else {
        println!("Water on {}: {total:.2} L", date.format("%Y-%m-%d"));
    }
    Ok(())
}
