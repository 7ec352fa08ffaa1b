use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::fs::{ConfigFs, with_suffix};

pub const CONFIG_BACKUP_COUNT: usize = 5;

pub const MOST_RECENT_LABEL: &str = "most recent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupCandidate {
    pub path: PathBuf,
    pub label: String,
}

pub fn backup_slot_path(config_path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        with_suffix(config_path, ".bak")
    } else {
        with_suffix(config_path, &format!(".bak.{index}"))
    }
}

pub fn backup_candidates(config_path: &Path, retention: usize) -> Vec<BackupCandidate> {
    (0..retention)
        .map(|i| BackupCandidate {
            path: backup_slot_path(config_path, i),
            label: if i == 0 {
                MOST_RECENT_LABEL.to_string()
            } else {
                format!(".bak.{i}")
            },
        })
        .collect()
}

pub fn rotate_backups(fs: &dyn ConfigFs, config_path: &Path, retention: usize) -> Result<()> {
    if retention == 0 || !fs.exists(config_path) {
        return Ok(());
    }

    for i in (1..retention).rev() {
        let older = backup_slot_path(config_path, i);
        let newer = backup_slot_path(config_path, i - 1);
        if !fs.exists(&newer) {
            continue;
        }
        fs.rename(&newer, &older)?;
    }

    let latest = backup_slot_path(config_path, 0);
    fs.copy(config_path, &latest)?;
    debug!(
        config = %config_path.display(),
        backup = %latest.display(),
        "rotated config backups"
    );
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupSlotInfo {
    pub path: PathBuf,
    pub label: String,
    pub exists: bool,
    pub bytes: Option<usize>,
    pub sha256: Option<String>,
}

pub fn inventory(fs: &dyn ConfigFs, config_path: &Path, retention: usize) -> Vec<BackupSlotInfo> {
    backup_candidates(config_path, retention)
        .into_iter()
        .map(|c| {
            let body = if fs.exists(&c.path) {
                fs.read_to_string(&c.path).ok()
            } else {
                None
            };
            BackupSlotInfo {
                exists: fs.exists(&c.path),
                bytes: body.as_ref().map(String::len),
                sha256: body.as_ref().map(|b| hex::encode(Sha256::digest(b.as_bytes()))),
                path: c.path,
                label: c.label,
            }
        })
        .collect()
}

pub fn format_inventory(slots: &[BackupSlotInfo]) -> String {
    if slots.is_empty() {
        return "backups: retention disabled".into();
    }
    let mut out = String::new();
    out.push_str("backups:\n");
    for s in slots {
        let size = s
            .bytes
            .map(|b| format!("{b}B"))
            .unwrap_or_else(|| "-".to_string());
        let digest = s
            .sha256
            .as_deref()
            .map(|d| &d[..d.len().min(12)])
            .unwrap_or("-");
        out.push_str(&format!(
            "- {:<12} exists={:<5} size={:<8} sha256={} path={}\n",
            s.label,
            s.exists,
            size,
            digest,
            s.path.display()
        ));
    }
    out
}
