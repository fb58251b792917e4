use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

use crate::error::StoreError;

/// Compute the first cron-matching instant strictly after `from`, for a
/// standard 5-field expression (minute hour day-of-month month day-of-week).
///
/// The `cron` crate's grammar includes a leading seconds field and a
/// trailing optional year field; we pin seconds to `0` and year to `*` so
/// callers only ever see and write the familiar 5-field form.
pub fn calculate_next_run(expr: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(StoreError::InvalidCronExpression(format!(
            "'{expr}' must have exactly 5 fields (minute hour day-of-month month day-of-week)"
        )));
    }
    let extended = format!("0 {} {} {} {} {} *", fields[0], fields[1], fields[2], fields[3], fields[4]);
    let schedule = CronSchedule::from_str(&extended)
        .map_err(|e| StoreError::InvalidCronExpression(format!("'{expr}': {e}")))?;
    schedule
        .after(&from)
        .next()
        .ok_or_else(|| StoreError::InvalidCronExpression(format!("'{expr}' never fires again after {from}")))
}

/// Validate a cron expression without needing a reference instant. An empty
/// string is valid (manual-only).
pub fn validate_cron(expr: &str) -> Result<(), StoreError> {
    if expr.is_empty() {
        return Ok(());
    }
    calculate_next_run(expr, Utc::now()).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_five_minutes() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 12, 3, 0).unwrap();
        let next = calculate_next_run("*/5 * * * *", from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn strictly_after_from() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 12, 5, 0).unwrap();
        let next = calculate_next_run("*/5 * * * *", from).unwrap();
        assert!(next > from);
    }

    #[test]
    fn empty_is_manual_only() {
        assert!(validate_cron("").is_ok());
    }

    #[test]
    fn malformed_expression_rejected() {
        assert!(validate_cron("not a cron").is_err());
        assert!(validate_cron("* * *").is_err());
    }
}
