//! Schedule constructors: `every`, `daily`, `weekly`, `monthly`, `cron`.
//!
//! Each constructor lowers its inputs to a canonical cron expression and
//! returns an immutable [`ScheduleDescriptor`]. Validation happens here,
//! at construction time -- a descriptor that exists always parses under
//! the evaluator.

use std::collections::HashMap;

use chronod_types::error::ScheduleError;
use chronod_types::schedule::{ScheduleDescriptor, ScheduleKind};

use super::duration::{parse_clock, parse_weekday, weekday_name};
use super::evaluator::CronEvaluator;

// ---------------------------------------------------------------------------
// every
// ---------------------------------------------------------------------------

/// Run on a fixed interval, e.g. `every("15m")`.
///
/// Accepted form: `<n><s|m|h|d|w>` with `n > 0`. Intervals that do not
/// fit a cron field are rounded up to the next coarser unit (`"90s"`
/// becomes a 2-minute schedule); `humanReadable` describes the cadence
/// that actually runs, while `originalParams` keeps the raw input.
pub fn every(interval: &str) -> Result<ScheduleDescriptor, ScheduleError> {
    let (value, unit) = split_interval(interval)?;
    let (cron, value, unit) = lower_interval(value, unit);
    Ok(descriptor(
        ScheduleKind::Interval,
        cron,
        render_interval(value, unit),
        HashMap::from([("interval".to_string(), serde_json::json!(interval))]),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    fn noun(self) -> &'static str {
        match self {
            IntervalUnit::Seconds => "second",
            IntervalUnit::Minutes => "minute",
            IntervalUnit::Hours => "hour",
            IntervalUnit::Days => "day",
            IntervalUnit::Weeks => "week",
        }
    }
}

fn split_interval(interval: &str) -> Result<(u64, IntervalUnit), ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(interval.to_string());
    let trimmed = interval.trim();
    let unit_start = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = trimmed.split_at(unit_start);

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }
    let unit = match unit {
        "s" => IntervalUnit::Seconds,
        "m" => IntervalUnit::Minutes,
        "h" => IntervalUnit::Hours,
        "d" => IntervalUnit::Days,
        "w" => IntervalUnit::Weeks,
        _ => return Err(invalid()),
    };
    Ok((value, unit))
}

/// Lower an interval to cron, promoting to the next coarser unit when
/// the value no longer fits the field. Returns the expression together
/// with the effective `(value, unit)` pair after promotion so callers
/// can render what actually runs.
fn lower_interval(value: u64, unit: IntervalUnit) -> (String, u64, IntervalUnit) {
    match unit {
        IntervalUnit::Seconds if value < 60 => (format!("*/{value} * * * * *"), value, unit),
        IntervalUnit::Seconds => lower_interval(value.div_ceil(60), IntervalUnit::Minutes),
        IntervalUnit::Minutes if value < 60 => (format!("*/{value} * * * *"), value, unit),
        IntervalUnit::Minutes => lower_interval(value.div_ceil(60), IntervalUnit::Hours),
        IntervalUnit::Hours if value < 24 => (format!("0 */{value} * * *"), value, unit),
        IntervalUnit::Hours => lower_interval(value.div_ceil(24), IntervalUnit::Days),
        IntervalUnit::Days if value == 1 => ("0 0 * * *".to_string(), value, unit),
        IntervalUnit::Days => (format!("0 0 */{value} * *"), value, unit),
        IntervalUnit::Weeks if value == 1 => ("0 0 * * 0".to_string(), value, unit),
        IntervalUnit::Weeks => lower_interval(value.saturating_mul(7), IntervalUnit::Days),
    }
}

fn render_interval(value: u64, unit: IntervalUnit) -> String {
    if value == 1 {
        format!("every {}", unit.noun())
    } else {
        format!("every {value} {}s", unit.noun())
    }
}

// ---------------------------------------------------------------------------
// daily
// ---------------------------------------------------------------------------

/// Run every day at the given `"HH:MM"` times.
///
/// Cron has one hour field and one minute field, so the times must share
/// either the hour or the minute; anything else is rejected.
pub fn daily(times: &[&str]) -> Result<ScheduleDescriptor, ScheduleError> {
    if times.is_empty() {
        return Err(ScheduleError::EmptyDailyTimes);
    }
    let mut parsed = times
        .iter()
        .map(|t| parse_clock(t))
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort_unstable();
    parsed.dedup();

    let same_minute = parsed.iter().all(|(_, m)| *m == parsed[0].1);
    let same_hour = parsed.iter().all(|(h, _)| *h == parsed[0].0);

    let cron = if same_minute {
        let hours: Vec<String> = parsed.iter().map(|(h, _)| h.to_string()).collect();
        format!("{} {} * * *", parsed[0].1, hours.join(","))
    } else if same_hour {
        let minutes: Vec<String> = parsed.iter().map(|(_, m)| m.to_string()).collect();
        format!("{} {} * * *", minutes.join(","), parsed[0].0)
    } else {
        return Err(ScheduleError::MixedDailyTimes(times.join(", ")));
    };

    let rendered: Vec<String> = parsed
        .iter()
        .map(|(h, m)| format_time_12h(*h, *m))
        .collect();
    Ok(descriptor(
        ScheduleKind::Daily,
        cron,
        format!("daily at {}", join_human(&rendered)),
        HashMap::from([("times".to_string(), serde_json::json!(times))]),
    ))
}

// ---------------------------------------------------------------------------
// weekly
// ---------------------------------------------------------------------------

/// Run on the given weekdays at an `"HH:MM"` time, e.g.
/// `weekly(&["mon", "fri"], "09:00")`. Duplicate days are deduplicated.
pub fn weekly(days: &[&str], at: &str) -> Result<ScheduleDescriptor, ScheduleError> {
    if days.is_empty() {
        return Err(ScheduleError::EmptyWeekdays);
    }
    let (hour, minute) = parse_clock(at)?;
    let mut indices = days
        .iter()
        .map(|d| parse_weekday(d))
        .collect::<Result<Vec<_>, _>>()?;
    indices.sort_unstable();
    indices.dedup();

    let day_list: Vec<String> = indices.iter().map(|d| d.to_string()).collect();
    let names: Vec<String> = indices
        .iter()
        .map(|d| weekday_name(*d).to_string())
        .collect();

    Ok(descriptor(
        ScheduleKind::Weekly,
        format!("{minute} {hour} * * {}", day_list.join(",")),
        format!(
            "every {} at {}",
            join_human(&names),
            format_time_12h(hour, minute)
        ),
        HashMap::from([
            ("days".to_string(), serde_json::json!(days)),
            ("time".to_string(), serde_json::json!(at)),
        ]),
    ))
}

// ---------------------------------------------------------------------------
// monthly
// ---------------------------------------------------------------------------

/// Day-of-month selector for [`monthly`]: a fixed day (1-31) or a
/// `"last-<weekday>"` token resolved at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthDay {
    Day(u32),
    Token(String),
}

impl From<u32> for MonthDay {
    fn from(day: u32) -> Self {
        MonthDay::Day(day)
    }
}

impl From<&str> for MonthDay {
    fn from(token: &str) -> Self {
        MonthDay::Token(token.to_string())
    }
}

/// Run once a month: on a fixed day (`monthly(15, "09:00")`) or on the
/// last occurrence of a weekday (`monthly("last-fri", "17:00")`).
///
/// The last-weekday form lowers to the `L` day-of-week suffix, which the
/// evaluator resolves to the final such weekday of each month.
pub fn monthly(day: impl Into<MonthDay>, at: &str) -> Result<ScheduleDescriptor, ScheduleError> {
    let (hour, minute) = parse_clock(at)?;
    let time = format_time_12h(hour, minute);

    let (cron, human, day_param) = match day.into() {
        MonthDay::Day(d) if (1..=31).contains(&d) => (
            format!("{minute} {hour} {d} * *"),
            format!("day {d} of every month at {time}"),
            serde_json::json!(d),
        ),
        MonthDay::Day(d) => return Err(ScheduleError::InvalidMonthDay(d.to_string())),
        MonthDay::Token(token) => {
            let weekday = token
                .strip_prefix("last-")
                .and_then(|rest| parse_weekday(rest).ok())
                .ok_or_else(|| ScheduleError::InvalidMonthDay(token.clone()))?;
            (
                format!("{minute} {hour} * * {weekday}L"),
                format!("last {} of every month at {time}", weekday_name(weekday)),
                serde_json::json!(token),
            )
        }
    };

    Ok(descriptor(
        ScheduleKind::Monthly,
        cron,
        human,
        HashMap::from([
            ("day".to_string(), day_param),
            ("time".to_string(), serde_json::json!(at)),
        ]),
    ))
}

// ---------------------------------------------------------------------------
// cron
// ---------------------------------------------------------------------------

/// Use a raw cron expression, canonicalized by whitespace compression.
///
/// 5 fields are minute/hour/day-of-month/month/day-of-week; a 6th leading
/// field adds seconds. The expression must parse under the evaluator, so
/// a bad expression fails here instead of at fire time.
pub fn cron(expression: &str) -> Result<ScheduleDescriptor, ScheduleError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 && fields.len() != 6 {
        return Err(ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5 or 6 fields, got {}", fields.len()),
        });
    }
    for field in &fields {
        let ok = field
            .chars()
            .all(|c| c.is_ascii_digit() || "*,/-LW#".contains(c));
        if !ok {
            return Err(ScheduleError::InvalidCron {
                expression: expression.to_string(),
                reason: format!("field '{field}' contains unsupported characters"),
            });
        }
    }
    let canonical = fields.join(" ");
    CronEvaluator::new(&canonical, None)?;

    Ok(descriptor(
        ScheduleKind::Cron,
        canonical.clone(),
        canonical,
        HashMap::from([("expression".to_string(), serde_json::json!(expression))]),
    ))
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

fn descriptor(
    kind: ScheduleKind,
    cron: String,
    human_readable: String,
    original_params: HashMap<String, serde_json::Value>,
) -> ScheduleDescriptor {
    ScheduleDescriptor {
        kind,
        cron,
        timezone: None,
        human_readable,
        original_params,
    }
}

/// `9:00 AM`, `5:30 PM`, `12:00 AM` for midnight.
fn format_time_12h(hour: u32, minute: u32) -> String {
    let (display_hour, suffix) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    format!("{display_hour}:{minute:02} {suffix}")
}

/// `a`, `a and b`, `a, b, and c`.
fn join_human(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [head @ .., last] => format!("{}, and {last}", head.join(", ")),
    }
}
