use std::io::{self, Write};

use anyhow::Result;
use clap::ValueEnum;
use droidsync_core::SyncConfig;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Profiles,
    Schedules,
}

pub fn run(config: &SyncConfig, what: ListKind) -> Result<()> {
    let stdout = io::stdout();
    render(&mut stdout.lock(), config, what)?;
    Ok(())
}

fn render(out: &mut impl Write, config: &SyncConfig, what: ListKind) -> io::Result<()> {
    match what {
        ListKind::Profiles => {
            writeln!(out, "Profiles:")?;
            for (name, profile) in &config.profiles {
                write!(out, "  {name}: {}", profile.command.join(" "))?;
                match &profile.workdir {
                    Some(dir) => writeln!(out, " (in {dir})")?,
                    None => writeln!(out)?,
                }
            }
        }
        ListKind::Schedules => {
            writeln!(out, "Schedules:")?;
            for (name, schedule) in &config.schedules {
                let when = schedule
                    .cron
                    .as_ref()
                    .map_or_else(|| "manual".to_string(), |c| c.to_string());
                writeln!(out, "  {name}: [{}] {when}", schedule.profiles.join(", "))?;
            }
        }
    }
    Ok(())
}
