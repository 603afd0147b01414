//! Cron evaluation: next-occurrence math in a fixed timezone.
//!
//! Wraps `croner` for the actual calendar arithmetic. Expressions are
//! normalized to croner's 6-field seconds form before parsing: a
//! standard 5-field expression gets a `0` seconds field prepended.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use chronod_types::error::ScheduleError;
use chronod_types::schedule::ScheduleDescriptor;

/// Evaluates a canonical cron expression (5 or 6 fields) in an IANA
/// timezone. Absent timezone means UTC.
pub struct CronEvaluator {
    cron: croner::Cron,
    timezone: Tz,
    expression: String,
}

impl CronEvaluator {
    pub fn new(expression: &str, timezone: Option<&str>) -> Result<Self, ScheduleError> {
        let normalized = normalize_fields(expression)?;
        let cron = normalized
            .parse::<croner::Cron>()
            .map_err(|e| ScheduleError::InvalidCron {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;
        let timezone = match timezone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))?,
            None => Tz::UTC,
        };
        Ok(Self {
            cron,
            timezone,
            expression: normalized,
        })
    }

    /// Build an evaluator from a compiled descriptor.
    pub fn for_descriptor(descriptor: &ScheduleDescriptor) -> Result<Self, ScheduleError> {
        Self::new(&descriptor.cron, descriptor.timezone.as_deref())
    }

    /// First matching instant strictly after `after`.
    ///
    /// Occurrences are computed in the evaluator's timezone, so DST
    /// transitions follow wall-clock rules: instants inside a
    /// spring-forward gap are skipped to the first valid occurrence
    /// after it, and a repeated fall-back wall time yields once.
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.cron
            .iter_after(local)
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// The normalized (6-field) expression this evaluator runs.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl std::fmt::Debug for CronEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronEvaluator")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone)
            .finish()
    }
}

/// Normalize to the 6-field seconds form croner expects.
fn normalize_fields(expression: &str) -> Result<String, ScheduleError> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    match parts.len() {
        5 => Ok(format!("0 {}", parts.join(" "))),
        6 => Ok(parts.join(" ")),
        n => Err(ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5 or 6 fields, got {n}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn five_field_expression_gains_seconds_field() {
        let eval = CronEvaluator::new("*/15 * * * *", None).unwrap();
        assert_eq!(eval.expression(), "0 */15 * * * *");
    }

    #[test]
    fn six_field_expression_passes_through() {
        let eval = CronEvaluator::new("30 */5 * * * *", None).unwrap();
        assert_eq!(eval.expression(), "30 */5 * * * *");
    }

    #[test]
    fn next_run_daily_in_utc() {
        let eval = CronEvaluator::new("0 9 * * *", None).unwrap();
        let next = eval.next_run(utc(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 9, 0, 0));

        // Strictly after: asking at exactly 09:00 moves to the next day.
        let next = eval.next_run(utc(2024, 1, 1, 9, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 2, 9, 0, 0));
    }

    #[test]
    fn next_run_with_seconds_field() {
        let eval = CronEvaluator::new("*/15 * * * * *", None).unwrap();
        let next = eval.next_run(utc(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 0, 0, 15));
    }

    #[test]
    fn next_run_honors_timezone() {
        // 09:00 in New York is 14:00 UTC during standard time.
        let eval = CronEvaluator::new("0 9 * * *", Some("America/New_York")).unwrap();
        let next = eval.next_run(utc(2024, 1, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 1, 14, 0, 0));
    }

    #[test]
    fn next_run_resolves_last_weekday_suffix() {
        // Last Friday of March 2024 is the 29th.
        let eval = CronEvaluator::new("0 17 * * 5L", None).unwrap();
        let next = eval.next_run(utc(2024, 3, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 3, 29, 17, 0, 0));
    }

    #[test]
    fn successive_runs_advance() {
        let eval = CronEvaluator::new("*/5 * * * *", None).unwrap();
        let first = eval.next_run(utc(2024, 6, 1, 12, 1, 0)).unwrap();
        let second = eval.next_run(first).unwrap();
        assert_eq!(first, utc(2024, 6, 1, 12, 5, 0));
        assert_eq!(second, utc(2024, 6, 1, 12, 10, 0));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronEvaluator::new("* * *", None).is_err());
        assert!(CronEvaluator::new("* * * * * * *", None).is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let err = CronEvaluator::new("0 9 * * *", Some("Not/AZone")).unwrap_err();
        assert_eq!(err, ScheduleError::UnknownTimezone("Not/AZone".to_string()));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(CronEvaluator::new("99 99 * * *", None).is_err());
    }
}
