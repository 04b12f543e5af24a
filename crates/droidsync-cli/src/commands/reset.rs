use anyhow::Result;
use droidsync_core::SyncConfig;
use droidsync_scheduler::Scheduler;

pub fn run(config: &SyncConfig, schedule: &str) -> Result<()> {
    let state = Scheduler::from_config(config).reset(schedule)?;
    println!("Schedule '{schedule}' has been reset.");
    if let Some(next) = state.next_run {
        println!("Next run: {}", next.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
