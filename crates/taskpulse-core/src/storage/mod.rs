//! On-disk locations.
//!
//! Everything the pipeline persists lives in one directory:
//!
//! - `notifications.toml`: delivery tuning ([`NotifyConfig`])
//! - `notification_preferences.json`: per-user preferences, keyed by user id
//!
//! The queue and delivery history are process-local and never written here.

mod config;

pub use config::NotifyConfig;

use std::path::{Path, PathBuf};

const ENV_VAR: &str = "TASKPULSE_ENV";

/// Directory holding the config and preferences files, created on first use.
///
/// Resolves under `$HOME/.config`. Development builds (`TASKPULSE_ENV=dev`)
/// get a separate directory so they never read production preferences.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let dir = dir_under(&home, std::env::var(ENV_VAR).ok().as_deref());
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn dir_under(home: &Path, env: Option<&str>) -> PathBuf {
    let name = match env {
        Some("dev") => "taskpulse-dev",
        _ => "taskpulse",
    };
    home.join(".config").join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_environment_gets_its_own_directory() {
        let home = Path::new("/home/ada");
        assert_eq!(dir_under(home, None), home.join(".config/taskpulse"));
        assert_eq!(dir_under(home, Some("production")), home.join(".config/taskpulse"));
        assert_eq!(dir_under(home, Some("dev")), home.join(".config/taskpulse-dev"));
    }
}
