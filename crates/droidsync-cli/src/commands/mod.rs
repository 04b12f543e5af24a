pub mod check;
pub mod list;
pub mod reset;
pub mod run;
pub mod setup;
pub mod status;

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};

    use droidsync_core::SyncConfig;

    /// Writes a config rooted in `dir` and loads it.
    pub(crate) fn config_in(dir: &Path, body: &str) -> (SyncConfig, PathBuf) {
        let path = dir.join("config.toml");
        let general = format!(
            "[general]\ndata_dir = {:?}\nlog_dir = {:?}\n\n",
            dir.join("data").display().to_string(),
            dir.join("logs").display().to_string(),
        );
        std::fs::write(&path, general + body).expect("write config");
        let config = SyncConfig::load(&path).expect("load config");
        (config, path)
    }

    pub(crate) const BODY: &str = r#"
[profiles.photos]
command = ["true"]

[profiles.docs]
command = ["false"]

[schedules.nightly]
profiles = ["photos"]
cron = "0 3 * * *"

[schedules.broken]
profiles = ["photos", "docs"]
cron = "30 * * * *"

[schedules.adhoc]
profiles = ["docs"]
"#;
}
