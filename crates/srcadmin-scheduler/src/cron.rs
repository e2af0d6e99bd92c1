//! Reduced five-field calendar expressions
//!
//! `min hour day month dow`, of which only minute and hour are interpreted;
//! the remaining three fields are accepted for parse-compatibility and
//! treated as `*`. Field syntaxes: `*` (the field's current value at
//! scheduling time), a range-checked literal, or `*/S` (the next multiple of
//! S past the current value, wrapping to 0 when S overshoots the field).

use chrono::{DateTime, Duration, Local, Timelike};
use srcadmin_core::{Error, Result};

/// Compute the next fire time for `expr` strictly after `now`.
pub fn next_run(expr: &str, now: DateTime<Local>) -> Result<DateTime<Local>> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(Error::invalid_config(
            "calendar expression must have 5 fields: min hour day month dow",
        ));
    }

    let minute = parse_field(parts[0], 0, 59, now.minute() as i64)
        .map_err(|e| Error::invalid_config(format!("minute: {e}")))?;
    let hour = parse_field(parts[1], 0, 23, now.hour() as i64)
        .map_err(|e| Error::invalid_config(format!("hour: {e}")))?;

    let next = now
        .with_hour(hour as u32)
        .and_then(|t| t.with_minute(minute as u32))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .ok_or_else(|| Error::invalid_config("unrepresentable local time"))?;

    if next <= now {
        Ok(next + Duration::hours(24))
    } else {
        Ok(next)
    }
}

/// Validate an expression without scheduling anything.
pub fn validate(expr: &str) -> Result<()> {
    next_run(expr, Local::now()).map(|_| ())
}

fn parse_field(field: &str, lo: i64, hi: i64, current: i64) -> std::result::Result<i64, String> {
    if field == "*" {
        return Ok(current);
    }

    if let Some(step) = field.strip_prefix("*/") {
        let step: i64 = step
            .parse()
            .map_err(|_| format!("invalid step: {field}"))?;
        if step <= 0 {
            return Err(format!("invalid step: {field}"));
        }
        let v = ((current / step) + 1) * step;
        return Ok(if v > hi { 0 } else { v });
    }

    let v: i64 = field
        .parse()
        .map_err(|_| format!("invalid number: {field}"))?;
    if v < lo || v > hi {
        return Err(format!("out of range [{lo},{hi}]: {v}"));
    }
    Ok(v)
}
