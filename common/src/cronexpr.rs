//! Cron expression parsing and next-fire-time computation.
//!
//! The `cron` crate expects a seconds field. Classic five-field crontab
//! expressions are accepted by prepending `0`, so `* * * * *` means second 0
//! of every minute. Six- and seven-field expressions pass through untouched.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::errors::ScheduleError;

/// Parse a cron expression, normalizing five-field input.
pub fn parse(expr: &str) -> Result<Schedule, ScheduleError> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| ScheduleError::Parse {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// The earliest fire time strictly after `after`, or `None` for a schedule
/// with no future occurrence.
pub fn next_after(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_expression_fires_on_the_minute() {
        let schedule = parse("* * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
        let next = next_after(&schedule, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 10, 1, 0).unwrap());
    }

    #[test]
    fn next_fire_is_strictly_after_and_earliest() {
        let schedule = parse("0 */5 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 10, 5, 0).unwrap();
        let next = next_after(&schedule, after).unwrap();
        // strictly greater: the 10:05:00 instant itself must not be returned
        assert!(next > after);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 10, 10, 0).unwrap());
    }

    #[test]
    fn mid_minute_reference_rounds_up_to_next_match() {
        let schedule = parse("* * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 30).unwrap();
        let next = next_after(&schedule, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 10, 1, 0).unwrap());
    }

    #[test]
    fn six_field_expression_passes_through() {
        let schedule = parse("*/2 * * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 1).unwrap();
        let next = next_after(&schedule, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 2).unwrap());
    }

    #[test]
    fn garbage_expressions_are_parse_errors() {
        assert!(parse("not a cron").is_err());
        assert!(parse("99 * * * *").is_err());
        assert!(parse("").is_err());
    }
}
