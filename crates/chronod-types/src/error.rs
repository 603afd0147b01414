use thiserror::Error;

/// Invalid schedule-builder input, cron expression, or timezone.
///
/// Raised synchronously at construction or registration time; execution
/// never sees these. Every variant carries the offending literal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid interval: '{0}' (expected <n><s|m|h|d|w> with n > 0)")]
    InvalidInterval(String),

    #[error("invalid duration: '{0}' (expected <n><ms|s|m|h|d|w>)")]
    InvalidDuration(String),

    #[error("invalid time: '{0}' (expected HH:MM, 24-hour)")]
    InvalidTime(String),

    #[error("invalid weekday: '{0}' (expected sun, mon, tue, wed, thu, fri or sat)")]
    InvalidWeekday(String),

    #[error("invalid day of month: '{0}' (expected 1-31 or last-<weekday>)")]
    InvalidMonthDay(String),

    #[error("daily times must share the same hour or same minute: {0}")]
    MixedDailyTimes(String),

    #[error("daily() requires at least one HH:MM time")]
    EmptyDailyTimes,

    #[error("weekly() requires at least one weekday")]
    EmptyWeekdays,

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("unknown timezone: '{0}'")]
    UnknownTimezone(String),
}

/// Errors from job registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job '{0}' is already registered")]
    AlreadyRegistered(String),

    /// A string-typed config field (timeout, retry delay) failed to parse.
    #[error(transparent)]
    InvalidConfig(#[from] ScheduleError),
}

/// Errors from worker operations addressed by job id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("job '{0}' not found")]
    JobNotFound(String),
}
