//! Process-table access for stale job detection.

use std::io;

use chrono::{DateTime, NaiveDateTime, Utc};

/// What the engine needs to know about (and do to) OS processes.
pub trait ProcessProbe: Send + Sync {
    /// Whether a process with this pid currently exists.
    fn exists(&self, pid: u32) -> bool;

    /// When the process started, as naive local time. `None` if it is gone or
    /// its start time cannot be read.
    fn start_time(&self, pid: u32) -> Option<NaiveDateTime>;

    /// Ask the process to exit (SIGTERM). Does not wait.
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

impl<P: ProcessProbe + ?Sized> ProcessProbe for std::sync::Arc<P> {
    fn exists(&self, pid: u32) -> bool {
        (**self).exists(pid)
    }

    fn start_time(&self, pid: u32) -> Option<NaiveDateTime> {
        (**self).start_time(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        (**self).terminate(pid)
    }
}

/// The real process table, via `kill(2)` and procfs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl SystemProbe {
    fn pid_t(pid: u32) -> Option<libc::pid_t> {
        // pid 0 and negative pids address process groups, never a single job.
        libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
    }
}

impl ProcessProbe for SystemProbe {
    fn exists(&self, pid: u32) -> bool {
        let Some(pid) = Self::pid_t(pid) else {
            return false;
        };
        // Signal 0 performs the permission and existence checks only.
        // SAFETY: kill(2) with signal 0 has no side effects on the target.
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn start_time(&self, pid: u32) -> Option<NaiveDateTime> {
        Self::pid_t(pid)?;
        procfs_start_time(pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let Some(pid) = Self::pid_t(pid) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal pid {pid}"),
            ));
        };
        // SAFETY: pid is a positive single-process id, so SIGTERM cannot fan
        // out to a process group.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Start time from `/proc/<pid>/stat` (field 22, clock ticks since boot) and
/// the boot time.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn procfs_start_time(pid: u32) -> Option<NaiveDateTime> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let start_ticks = parse_start_ticks(&stat)?;

    // SAFETY: sysconf has no preconditions.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    let started = start_from_boot(boot_time()?, start_ticks, hz as i64)?;
    Some(started.with_timezone(&chrono::Local).naive_local())
}

/// `btime` from `/proc/stat`, or now minus `/proc/uptime` where SELinux
/// denies `/proc/stat` (untrusted apps on Android 8+).
#[cfg(any(target_os = "linux", target_os = "android"))]
fn boot_time() -> Option<DateTime<Utc>> {
    let btime = std::fs::read_to_string("/proc/stat")
        .ok()
        .and_then(|stat| parse_boot_time(&stat));
    if let Some(btime) = btime {
        return DateTime::from_timestamp(btime, 0);
    }
    let uptime = std::fs::read_to_string("/proc/uptime").ok()?;
    boot_from_uptime(Utc::now(), parse_uptime(&uptime)?)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn procfs_start_time(_pid: u32) -> Option<NaiveDateTime> {
    None
}

/// The command name in field 2 may contain spaces and parentheses, so fields
/// are counted from the last `)`.
#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn parse_start_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    // rest starts at field 3 (state); starttime is field 22.
    rest.split_whitespace().nth(19)?.parse().ok()
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn parse_boot_time(stat: &str) -> Option<i64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

/// First field of `/proc/uptime`: seconds since boot.
#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn parse_uptime(uptime: &str) -> Option<f64> {
    uptime
        .split_whitespace()
        .next()?
        .parse()
        .ok()
        .filter(|secs: &f64| secs.is_finite() && *secs >= 0.0)
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn boot_from_uptime(now: DateTime<Utc>, uptime_secs: f64) -> Option<DateTime<Utc>> {
    let millis = (uptime_secs * 1000.0).round() as i64;
    now.checked_sub_signed(chrono::Duration::milliseconds(millis))
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn start_from_boot(boot: DateTime<Utc>, start_ticks: u64, hz: i64) -> Option<DateTime<Utc>> {
    if hz <= 0 {
        return None;
    }
    let millis = i64::try_from(start_ticks).ok()?.checked_mul(1000)? / hz;
    boot.checked_add_signed(chrono::Duration::milliseconds(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_ticks_survive_odd_command_names() {
        let stat = "1234 (weird) name)) S 1 1234 1234 0 -1 4194560 100 0 0 0 1 2 0 0 20 0 1 0 98765 1000000 200";
        assert_eq!(parse_start_ticks(stat), Some(98765));
        assert_eq!(parse_start_ticks("garbage"), None);
    }

    #[test]
    fn boot_time_from_proc_stat() {
        let stat = "cpu  1 2 3 4\nintr 0\nbtime 1768780800\nprocesses 10\n";
        assert_eq!(parse_boot_time(stat), Some(1_768_780_800));
        assert_eq!(parse_boot_time("cpu 1 2 3"), None);
    }

    #[test]
    fn uptime_parsing() {
        assert_eq!(parse_uptime("3600.50 7100.25\n"), Some(3600.5));
        assert_eq!(parse_uptime(""), None);
        assert_eq!(parse_uptime("-4.0 1.0"), None);
    }

    #[test]
    fn start_time_from_uptime_when_proc_stat_is_denied() {
        let now = DateTime::from_timestamp(1_768_800_000, 0).unwrap();
        let boot = boot_from_uptime(now, parse_uptime("3600.50 7100.25").unwrap()).unwrap();
        assert_eq!(boot, DateTime::from_timestamp_millis(1_768_796_399_500).unwrap());

        // 250 ticks at 100 Hz is 2.5 s after boot.
        let started = start_from_boot(boot, 250, 100).unwrap();
        assert_eq!(started, DateTime::from_timestamp(1_768_796_402, 0).unwrap());
        assert_eq!(start_from_boot(boot, 250, 0), None);
    }

    #[test]
    fn pid_zero_never_exists_and_is_never_signalled() {
        let probe = SystemProbe;
        assert!(!probe.exists(0));
        assert!(probe.start_time(0).is_none());
        assert!(probe.terminate(0).is_err());
        assert!(!probe.exists(u32::MAX));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(SystemProbe.exists(std::process::id()));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn current_process_start_time_is_in_the_past() {
        let started = SystemProbe
            .start_time(std::process::id())
            .expect("procfs start time");
        let now = chrono::Local::now().naive_local();
        assert!(started <= now + chrono::Duration::seconds(2));
        assert!(now - started < chrono::Duration::hours(24));
    }
}
