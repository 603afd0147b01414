//! Compiled schedule descriptors.
//!
//! A [`ScheduleDescriptor`] is the immutable output of the schedule
//! builders in `chronod-core`: a canonical cron expression plus the
//! metadata the dashboard and platform validators need. Descriptors are
//! values -- [`ScheduleDescriptor::with_timezone`] returns a new
//! descriptor and never mutates the original.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Which builder produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Interval,
    Daily,
    Weekly,
    Monthly,
    Cron,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleKind::Interval => "interval",
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
            ScheduleKind::Monthly => "monthly",
            ScheduleKind::Cron => "cron",
        };
        f.write_str(s)
    }
}

/// The immutable compiled form of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDescriptor {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    /// Canonical cron expression, 5 or 6 whitespace-separated fields.
    /// The 6-field form carries a leading seconds field.
    pub cron: String,
    /// IANA zone name. Absent means worker default (UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub human_readable: String,
    /// The builder inputs, preserved for debugging and platform
    /// validation only.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub original_params: HashMap<String, serde_json::Value>,
}

impl ScheduleDescriptor {
    /// Return a copy of this descriptor pinned to an IANA timezone.
    pub fn with_timezone(&self, timezone: &str) -> Result<Self, ScheduleError> {
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ScheduleError::UnknownTimezone(timezone.to_string()));
        }
        let mut refined = self.clone();
        refined.timezone = Some(timezone.to_string());
        Ok(refined)
    }
}
