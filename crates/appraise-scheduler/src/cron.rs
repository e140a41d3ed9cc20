//! Minimal cron expression support.
//!
//! Accepts the 5-field form "MIN HOUR DOM MON DOW" with `*`, `*/N`,
//! comma lists, and single values on the minute and hour fields. The
//! calendar fields are accepted but only `*` matching is applied —
//! every registered Appraise task runs on a minute/hour cadence (the
//! default is `*/10 * * * *`).

use chrono::{DateTime, Duration, Timelike, Utc};

/// A parsed schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronSchedule {
    /// Parse an expression; `None` for anything malformed.
    pub fn parse(expression: &str) -> Option<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return None;
        }
        Some(Self {
            minutes: parse_field(parts[0], 0, 59)?,
            hours: parse_field(parts[1], 0, 23)?,
        })
    }

    /// The first matching instant strictly after `after`, or `None` if
    /// nothing matches within the next 48 hours.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (after + Duration::minutes(1))
            .with_second(0)
            .and_then(|c| c.with_nanosecond(0))
            .unwrap_or(after + Duration::minutes(1));

        for _ in 0..(48 * 60) {
            if self.minutes.contains(&candidate.minute()) && self.hours.contains(&candidate.hour())
            {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

/// Parse and compute in one step; logs a warning for bad expressions.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression) {
        Some(schedule) => schedule.next_after(after),
        None => {
            tracing::warn!(
                "Invalid cron expression: '{}' (need 5 fields: MIN HOUR DOM MON DOW)",
                expression
            );
            None
        }
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    if field.contains(',') {
        let values: std::result::Result<Vec<u32>, _> =
            field.split(',').map(|s| s.trim().parse()).collect();
        let values = values.ok()?;
        if values.iter().any(|v| *v < min || *v > max) {
            return None;
        }
        return Some(values);
    }

    let n: u32 = field.parse().ok()?;
    (n >= min && n <= max).then(|| vec![n])
}
