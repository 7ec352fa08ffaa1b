use std::path::PathBuf;

use crate::backups::CONFIG_BACKUP_COUNT;

pub const CONFIG_ENV: &str = "SENTINEL_CONFIG";
pub const BACKUPS_ENV: &str = "SENTINEL_BACKUPS";
const CONFIG_DIR: &str = ".sentinel";
const CONFIG_FILE: &str = "config.json";
const FALLBACK_CONFIG_FILE: &str = "sentinel.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub backup_retention: usize,
}

impl Settings {
    pub fn resolve(config_path: Option<PathBuf>, backup_retention: Option<usize>) -> Self {
        Self {
            config_path: config_path.unwrap_or_else(|| default_config_path(home_dir())),
            backup_retention: backup_retention.unwrap_or(CONFIG_BACKUP_COUNT),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

pub fn default_config_path(home: Option<PathBuf>) -> PathBuf {
    match home {
        Some(home) => home.join(CONFIG_DIR).join(CONFIG_FILE),
        None => PathBuf::from(FALLBACK_CONFIG_FILE),
    }
}
