use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use calori_core::stats::DayBoundary;

pub(crate) fn parse_date(date_str: Option<String>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today),
        Some(s) => match s.as_str() {
            "today" => Ok(today),
            "yesterday" => Ok(today - chrono::Duration::days(1)),
            "tomorrow" => Ok(today + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse an `--at` timestamp: RFC 3339, or "YYYY-MM-DD HH:MM" / "HH:MM" on
/// the configured day boundary.
pub(crate) fn parse_at(
    at: Option<String>,
    boundary: DayBoundary,
) -> Result<Option<DateTime<Utc>>> {
    let Some(s) = at else {
        return Ok(None);
    };
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    let wall = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .or_else(|_| {
            chrono::NaiveTime::parse_from_str(s, "%H:%M")
                .map(|t| boundary.today().and_time(t))
        })
        .with_context(|| {
            format!("Invalid time '{s}'. Use HH:MM, 'YYYY-MM-DD HH:MM' or RFC 3339")
        })?;
    let Some(ts) = boundary.to_utc(wall) else {
        bail!("'{s}' does not exist or is ambiguous in the local timezone");
    };
    Ok(Some(ts))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

pub(crate) fn or_dash<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_parse_date_none() {
        assert_eq!(parse_date(None, today()).unwrap(), today());
    }

    #[test]
    fn test_parse_date_keywords() {
        assert_eq!(parse_date(Some("today".to_string()), today()).unwrap(), today());
        assert_eq!(
            parse_date(Some("yesterday".to_string()), today()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string()), today()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string()), today()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string()), today()).is_err());
    }

    #[test]
    fn test_parse_at() {
        let plus7 = DayBoundary::from_offset_minutes(420).unwrap();
        assert_eq!(parse_at(None, plus7).unwrap(), None);
        assert_eq!(
            parse_at(Some("2024-03-01 06:00".to_string()), plus7).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap())
        );
        assert_eq!(
            parse_at(Some("2024-03-01T06:00:00Z".to_string()), plus7).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap())
        );
        let ts = parse_at(Some("07:30".to_string()), plus7).unwrap().unwrap();
        assert_eq!(plus7.day_of(ts), plus7.today());
        assert!(parse_at(Some("half past".to_string()), plus7).is_err());
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Nasi goreng kampung", 10), "Nasi go...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(-3.0), -3.0);
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(None::<f64>), "-");
        assert_eq!(or_dash(Some(3)), "3");
    }
}
