use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use chrono::NaiveDateTime;
use droidsync_core::SyncConfig;
use droidsync_scheduler::{JobSchedule, ScheduleState, ScheduleStatus, Scheduler};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn run(config: &SyncConfig) -> Result<()> {
    let scheduler = Scheduler::from_config(config);
    let stdout = io::stdout();
    let color = stdout.is_terminal();
    render(&mut stdout.lock(), &scheduler.states(), scheduler.now(), color)?;
    Ok(())
}

/// ANSI colour for a status word: green success, yellow running, red failed.
fn paint(status: ScheduleStatus, color: bool) -> String {
    let code = match status {
        ScheduleStatus::Success => "32",
        ScheduleStatus::Running => "33",
        ScheduleStatus::Failed => "31",
        ScheduleStatus::Pending => return status.to_string(),
    };
    if color {
        format!("\x1b[{code}m{status}\x1b[0m")
    } else {
        status.to_string()
    }
}

fn render(
    out: &mut impl Write,
    states: &[(&JobSchedule, ScheduleState)],
    now: NaiveDateTime,
    color: bool,
) -> io::Result<()> {
    if states.is_empty() {
        return writeln!(out, "No schedules configured.");
    }

    for (job, state) in states {
        writeln!(out, "\nSchedule: {}", job.name)?;
        match &job.cron {
            Some(cron) => writeln!(out, "  Type: Scheduled (cron: {cron})")?,
            None => writeln!(out, "  Type: Manual (no automatic scheduling)")?,
        }

        let status = paint(state.status, color);
        match state.pid.filter(|_| state.is_running()) {
            Some(pid) => writeln!(out, "  Status: {status} (PID {pid})")?,
            None => writeln!(out, "  Status: {status}")?,
        }

        if let Some(started) = state.started_at.filter(|_| state.is_running()) {
            writeln!(out, "  Started: {}", started.format(TIME_FORMAT))?;
        } else if let Some(last) = state.last_run {
            writeln!(out, "  Last Run: {}", last.format(TIME_FORMAT))?;
        } else if let (ScheduleStatus::Failed, Some(started)) = (state.status, state.started_at) {
            writeln!(out, "  Last Attempt: {}", started.format(TIME_FORMAT))?;
        }

        match state.next_run {
            Some(next) => {
                writeln!(out, "  Next Run: {}", next.format(TIME_FORMAT))?;
                if now >= next {
                    let minutes = (now - next).num_minutes();
                    writeln!(out, "  Overdue: Yes ({minutes} minutes)")?;
                } else {
                    writeln!(out, "  Overdue: No")?;
                }
            }
            None => writeln!(out, "  Next Run: N/A")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use droidsync_core::CronExpr;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 19)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn rendered(states: &[(&JobSchedule, ScheduleState)], now: NaiveDateTime) -> String {
        rendered_with(states, now, false)
    }

    fn rendered_with(states: &[(&JobSchedule, ScheduleState)], now: NaiveDateTime, color: bool) -> String {
        let mut out = Vec::new();
        render(&mut out, states, now, color).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn overdue_cron_schedule() {
        let job = JobSchedule::new("nightly", Some(CronExpr::parse("0 3 * * *").unwrap()));
        let mut state = ScheduleState::initial("nightly", Some(at(3, 0)));
        state.status = ScheduleStatus::Success;
        state.last_run = Some(at(2, 0));

        let text = rendered(&[(&job, state)], at(5, 0));
        assert!(text.contains("Schedule: nightly"));
        assert!(text.contains("Type: Scheduled (cron: 0 3 * * *)"));
        assert!(text.contains("Status: success"));
        assert!(text.contains("Last Run: 2026-01-19 02:00:00"));
        assert!(text.contains("Next Run: 2026-01-19 03:00:00"));
        assert!(text.contains("Overdue: Yes (120 minutes)"));
    }

    #[test]
    fn running_and_manual_schedules() {
        let nightly = JobSchedule::new("nightly", Some(CronExpr::parse("0 3 * * *").unwrap()));
        let mut running = ScheduleState::initial("nightly", Some(at(23, 0)));
        running.status = ScheduleStatus::Running;
        running.pid = Some(4242);
        running.started_at = Some(at(3, 1));

        let adhoc = JobSchedule::new("adhoc", None);
        let mut failed = ScheduleState::initial("adhoc", None);
        failed.status = ScheduleStatus::Failed;
        failed.started_at = Some(at(1, 0));

        let text = rendered(&[(&nightly, running), (&adhoc, failed)], at(5, 0));
        assert!(text.contains("Status: running (PID 4242)"));
        assert!(text.contains("Started: 2026-01-19 03:01:00"));
        assert!(text.contains("Overdue: No"));
        assert!(text.contains("Type: Manual"));
        assert!(text.contains("Last Attempt: 2026-01-19 01:00:00"));
        assert!(text.contains("Next Run: N/A"));
    }

    #[test]
    fn status_words_are_coloured_on_a_terminal() {
        let job = JobSchedule::new("nightly", Some(CronExpr::parse("0 3 * * *").unwrap()));
        let mut state = ScheduleState::initial("nightly", Some(at(23, 0)));
        state.status = ScheduleStatus::Running;
        state.pid = Some(7);

        let colored = rendered_with(&[(&job, state.clone())], at(5, 0), true);
        assert!(colored.contains("Status: \x1b[33mrunning\x1b[0m (PID 7)"));
        let plain = rendered_with(&[(&job, state.clone())], at(5, 0), false);
        assert!(plain.contains("Status: running (PID 7)"));
        assert!(!plain.contains('\x1b'));

        state.status = ScheduleStatus::Failed;
        state.pid = None;
        let failed = rendered_with(&[(&job, state.clone())], at(5, 0), true);
        assert!(failed.contains("Status: \x1b[31mfailed\x1b[0m"));

        state.status = ScheduleStatus::Success;
        let success = rendered_with(&[(&job, state.clone())], at(5, 0), true);
        assert!(success.contains("Status: \x1b[32msuccess\x1b[0m"));

        state.status = ScheduleStatus::Pending;
        let pending = rendered_with(&[(&job, state)], at(5, 0), true);
        assert!(pending.contains("Status: pending\n"));
    }

    #[test]
    fn no_schedules() {
        assert_eq!(rendered(&[], at(5, 0)), "No schedules configured.\n");
    }
}
