//! Duration and clock-time parsing for schedule and config inputs.

use std::time::Duration;

use chronod_types::error::ScheduleError;

/// Parse a duration string like `"30s"`, `"5m"`, `"250ms"` into a
/// [`Duration`] with millisecond precision.
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`. A bare number without a unit is
/// rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ScheduleError> {
    let trimmed = input.trim();
    let unit_start = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ScheduleError::InvalidDuration(input.to_string()))?;
    let (digits, unit) = trimmed.split_at(unit_start);

    let value: u64 = digits
        .parse()
        .map_err(|_| ScheduleError::InvalidDuration(input.to_string()))?;

    let per_unit: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return Err(ScheduleError::InvalidDuration(input.to_string())),
    };

    let millis = value
        .checked_mul(per_unit)
        .ok_or_else(|| ScheduleError::InvalidDuration(input.to_string()))?;
    Ok(Duration::from_millis(millis))
}

/// Parse `"HH:MM"` (24-hour) into `(hour, minute)`.
pub fn parse_clock(input: &str) -> Result<(u32, u32), ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(input.to_string());
    let (hour_part, minute_part) = input.trim().split_once(':').ok_or_else(invalid)?;

    let hour: u32 = hour_part.parse().map_err(|_| invalid())?;
    let minute: u32 = minute_part.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// Map a day-of-week token (`sun`..`sat`, case-insensitive) to cron's
/// 0-6 index.
pub fn parse_weekday(token: &str) -> Result<u32, ScheduleError> {
    match token.trim().to_ascii_lowercase().as_str() {
        "sun" => Ok(0),
        "mon" => Ok(1),
        "tue" => Ok(2),
        "wed" => Ok(3),
        "thu" => Ok(4),
        "fri" => Ok(5),
        "sat" => Ok(6),
        _ => Err(ScheduleError::InvalidWeekday(token.to_string())),
    }
}

/// Full weekday name for a cron 0-6 index, for human-readable rendering.
pub(crate) fn weekday_name(index: u32) -> &'static str {
    match index {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        _ => "Saturday",
    }
}
