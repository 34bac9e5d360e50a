//! Next-occurrence math for both schedule kinds.
//!
//! Recurring expressions are the classic 5-field form
//! (`min hour dom mon dow`); the underlying parser wants a seconds column,
//! so `"*/5 * * * *"` is evaluated as `"0 */5 * * * *"`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{CronError, Result};
use crate::types::Schedule;

/// Compute the next UTC execution time strictly after `after`.
///
/// `None` means the schedule is exhausted (a one-shot whose instant has
/// passed). An unparseable expression or timezone is an error, not `None`;
/// callers must reject such jobs at creation time.
pub fn next_occurrence(schedule: &Schedule, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    match schedule {
        Schedule::OneShot { .. } => {
            let at = schedule
                .one_shot_at()
                .ok_or_else(|| CronError::InvalidSchedule("one-shot instant out of range".into()))?;
            Ok(if at > after { Some(at) } else { None })
        }
        Schedule::Recurring { expr, tz } => {
            let parsed = parse_expr(expr)?;
            let zone = resolve_tz(tz.as_deref())?;
            let next = parsed
                .after(&after.with_timezone(&zone))
                .next()
                .map(|dt| dt.with_timezone(&Utc));
            Ok(next)
        }
    }
}

/// Validate a 5-field expression and optional timezone without scheduling.
pub fn validate(expr: &str, tz: Option<&str>) -> Result<()> {
    parse_expr(expr)?;
    resolve_tz(tz)?;
    Ok(())
}

fn parse_expr(expr: &str) -> Result<cron::Schedule> {
    let fields = expr.split_whitespace().count();
    let normalized = match fields {
        5 => format!("0 {expr}"),
        6 | 7 => expr.to_string(),
        _ => {
            return Err(CronError::InvalidSchedule(format!(
                "expected 5 cron fields, got {fields}: \"{expr}\""
            )))
        }
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| CronError::InvalidSchedule(format!("\"{expr}\": {e}")))
}

/// Default to UTC when no zone is stored. Jobs created through the cron
/// skill always carry the user timezone.
fn resolve_tz(tz: Option<&str>) -> Result<Tz> {
    match tz {
        None => Ok(chrono_tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| CronError::InvalidSchedule(format!("unknown timezone \"{name}\""))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn one_shot_future_fires_once() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let schedule = Schedule::OneShot {
            at_ms: at.timestamp_millis(),
        };
        let before = at - chrono::Duration::seconds(30);
        assert_eq!(next_occurrence(&schedule, before).unwrap(), Some(at));
        assert_eq!(next_occurrence(&schedule, at).unwrap(), None);
    }

    #[test]
    fn every_five_minutes() {
        let schedule = Schedule::Recurring {
            expr: "*/5 * * * *".to_string(),
            tz: None,
        };
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 12, 2, 10).unwrap();
        let next = next_occurrence(&schedule, after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn morning_at_eight_in_berlin() {
        let schedule = Schedule::Recurring {
            expr: "0 8 * * *".to_string(),
            tz: Some("Europe/Berlin".to_string()),
        };
        // 06:30 UTC in winter is 07:30 Berlin, so the next fire is 08:00 Berlin,
        // i.e. 07:00 UTC.
        let after = Utc.with_ymd_and_hms(2026, 1, 15, 6, 30, 0).unwrap();
        let next = next_occurrence(&schedule, after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).unwrap());
    }

    #[test]
    fn bad_expression_is_invalid_schedule() {
        assert!(matches!(
            validate("every five minutes", None),
            Err(CronError::InvalidSchedule(_))
        ));
        assert!(matches!(
            validate("*/5 * * *", None),
            Err(CronError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn bad_timezone_is_invalid_schedule() {
        assert!(matches!(
            validate("0 8 * * *", Some("Mars/Olympus")),
            Err(CronError::InvalidSchedule(_))
        ));
    }
}
