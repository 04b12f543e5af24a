//! Validated 5-field cron expressions.
//!
//! Config files use classic crontab syntax (`minute hour day-of-month month
//! day-of-week`, Sunday = 0 or 7). The `cron` crate expects a leading
//! seconds field and numbers weekdays from Sunday = 1, so [`CronExpr::parse`]
//! rewrites the expression before handing it over. Numeric weekday fields are
//! expanded into day names, which both dialects agree on.
//!
//! When both day-of-month and day-of-week are restricted, crontab fires on
//! days matching either field while the `cron` crate requires both. Such
//! expressions are split into one schedule per field and the earliest
//! occurrence wins.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A cron expression that is known to parse and to fire at least once more.
///
/// Construct with [`CronExpr::parse`] or by deserializing a string.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronExpr {
    source: String,
    /// One schedule, or two when day-of-month and day-of-week are OR-ed.
    schedules: Vec<cron::Schedule>,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let invalid = |reason: String| SyncError::InvalidCron {
            expr: expr.to_string(),
            reason,
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        };

        let dow = translate_weekdays(dow).map_err(invalid)?;
        let day_fields = if is_restricted(dom) && is_restricted(&dow) {
            vec![(*dom, "*"), ("*", dow.as_str())]
        } else {
            vec![(*dom, dow.as_str())]
        };

        let schedules = day_fields
            .into_iter()
            .map(|(dom, dow)| {
                let extended = format!("0 {minute} {hour} {dom} {month} {dow}");
                cron::Schedule::from_str(&extended).map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let expr = Self {
            source: fields.join(" "),
            schedules,
        };
        if expr.next_after(&Utc::now()).is_none() {
            return Err(invalid("expression never fires".to_string()));
        }
        Ok(expr)
    }

    /// The expression as written in the config (whitespace normalised).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The first occurrence strictly after `after`, if any.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(after).next())
            .min()
    }
}

fn is_restricted(field: &str) -> bool {
    field != "*" && field != "?"
}

impl PartialEq for CronExpr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpr {}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CronExpr {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronExpr {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CronExpr> for String {
    fn from(value: CronExpr) -> Self {
        value.source
    }
}

/// Rewrite a crontab day-of-week field into names understood by the `cron` crate.
///
/// Non-numeric items (`MON-FRI`, `*`, `?`) pass through untouched.
fn translate_weekdays(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days: Vec<u32> = Vec::new();
    let mut passthrough: Vec<String> = Vec::new();

    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}' in day-of-week"))?;
                if step == 0 {
                    return Err("day-of-week step must be > 0".to_string());
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        let range = match base {
            "*" | "?" => Some((0, 6)),
            _ => match base.split_once('-') {
                Some((lo, hi)) => match (weekday_number(lo)?, weekday_number(hi)?) {
                    (Some(lo), Some(hi)) => Some((lo, hi)),
                    (None, None) => None,
                    _ => return Err(format!("mixed names and numbers in '{base}'")),
                },
                None => match weekday_number(base)? {
                    // `n/step` means "from n through the end of the week".
                    Some(n) if step.is_some() => Some((n, 6)),
                    Some(n) => Some((n, n)),
                    None => None,
                },
            },
        };

        match range {
            Some((lo, hi)) => {
                if lo > hi {
                    return Err(format!("descending day-of-week range '{base}'"));
                }
                let step = step.unwrap_or(1) as usize;
                days.extend((lo..=hi).step_by(step).map(|d| d % 7));
            }
            None => passthrough.push(item.to_ascii_uppercase()),
        }
    }

    let mut out: Vec<String> = Vec::new();
    for day in days {
        let name = DAY_NAMES[day as usize].to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out.extend(passthrough);
    Ok(out.join(","))
}

/// `Ok(None)` for non-numeric tokens, an error for numbers outside 0..=7.
fn weekday_number(token: &str) -> std::result::Result<Option<u32>, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        return Ok(None);
    }
    match token.parse::<u32>() {
        Ok(n) if n <= 7 => Ok(Some(n)),
        _ => Err(format!("day-of-week '{token}' out of range 0-7")),
    }
}
