//! Timezone-aware cron evaluation for recurring reminders.
//!
//! Reminders store the conventional 5-field form (minute hour dom month
//! dow); the `cron` crate wants a seconds field, so expressions are
//! normalized before parsing. Occurrences are computed in the reminder's
//! own timezone, which gives wall-clock DST behaviour: a "every day at
//! 09:00" reminder fires at 09:00 local before and after a transition.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::error::SchedulerError;

/// Parse a 5-field cron expression (normalizing to the 6-field form).
pub fn parse_expression(reminder_id: &str, expr: &str) -> Result<cron::Schedule, SchedulerError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(SchedulerError::InvalidSchedule {
            reminder_id: reminder_id.to_string(),
            reason: format!("expected 5 cron fields, got {fields}"),
        });
    }
    cron::Schedule::from_str(&format!("0 {expr}")).map_err(|e| SchedulerError::InvalidSchedule {
        reminder_id: reminder_id.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an IANA timezone name, defaulting to UTC for absent values.
pub fn parse_timezone(reminder_id: &str, tz: Option<&str>) -> Result<Tz, SchedulerError> {
    match tz {
        None => Ok(chrono_tz::UTC),
        Some(name) => name.parse::<Tz>().map_err(|_| SchedulerError::InvalidSchedule {
            reminder_id: reminder_id.to_string(),
            reason: format!("unknown timezone: {name}"),
        }),
    }
}

/// Next occurrence strictly after `after`, evaluated in `tz`, returned in
/// UTC. `None` when the schedule has no future occurrence.
pub fn next_occurrence(
    schedule: &cron::Schedule,
    tz: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|local| local.with_timezone(&Utc))
}
