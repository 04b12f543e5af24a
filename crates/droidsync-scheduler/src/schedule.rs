use chrono::{NaiveDateTime, TimeZone, Utc};
use droidsync_core::CronExpr;

/// Compute the first occurrence of `cron` strictly after `from`.
///
/// Evaluation happens on naive wall-clock time: `from` is matched against the
/// expression as-is and the result carries no offset, so a daily `0 3 * * *`
/// stays at 03:00 across DST changes.
///
/// # Panics
///
/// Panics if the expression has no occurrence after `from`. [`CronExpr::parse`]
/// only admits expressions that keep firing, so this is a programming error.
pub fn next_run(cron: &CronExpr, from: NaiveDateTime) -> NaiveDateTime {
    let anchor = Utc.from_utc_datetime(&from);
    cron.next_after(&anchor)
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| panic!("cron expression '{cron}' has no occurrence after {from}"))
}

/// `next_run` for scheduled jobs, `None` for manual ones.
pub fn next_run_for(cron: Option<&CronExpr>, from: NaiveDateTime) -> Option<NaiveDateTime> {
    cron.map(|c| next_run(c, from))
}
