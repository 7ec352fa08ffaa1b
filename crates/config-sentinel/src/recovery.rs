use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::backups::{BackupCandidate, backup_candidates};
use crate::config::ConfigValidator;
use crate::error::{Error, Result};
use crate::fs::{ConfigFs, with_suffix};
use crate::parse::parse_config_text;

pub const QUARANTINE_SUFFIX: &str = ".corrupted";
const STAGING_SUFFIX: &str = ".restore-tmp";

#[derive(Debug, Clone)]
pub struct RecoveryCandidate<C> {
    pub path: PathBuf,
    pub label: String,
    pub config: C,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub enum RecoveryResult<C> {
    Recovered {
        candidate: RecoveryCandidate<C>,
        backups_checked: usize,
        /// `None` when there was no primary file to move aside.
        quarantine_path: Option<PathBuf>,
    },
    Failed {
        backups_checked: usize,
        reason: String,
    },
}

impl<C> RecoveryResult<C> {
    pub fn backups_checked(&self) -> usize {
        match self {
            Self::Recovered {
                backups_checked, ..
            }
            | Self::Failed {
                backups_checked, ..
            } => *backups_checked,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

#[derive(Debug)]
pub enum CandidateCheck<C> {
    Missing,
    Unusable(String),
    Usable(RecoveryCandidate<C>),
}

pub fn quarantine_path(config_path: &Path) -> PathBuf {
    with_suffix(config_path, QUARANTINE_SUFFIX)
}

fn staging_path(config_path: &Path) -> PathBuf {
    with_suffix(config_path, STAGING_SUFFIX)
}

/// Read, parse and validate one rotation slot. Never fails: problems come back
/// as [`CandidateCheck::Unusable`].
pub fn validate_candidate<V: ConfigValidator>(
    fs: &dyn ConfigFs,
    validator: &V,
    candidate: &BackupCandidate,
) -> CandidateCheck<V::Config> {
    if !fs.exists(&candidate.path) {
        return CandidateCheck::Missing;
    }
    let raw = match fs.read_to_string(&candidate.path) {
        Ok(raw) => raw,
        Err(e) => return CandidateCheck::Unusable(e.to_string()),
    };
    let parsed = match parse_config_text(&raw) {
        Ok(v) => v,
        Err(e) => return CandidateCheck::Unusable(e.to_string()),
    };
    match validator.validate(&parsed) {
        Ok(config) => CandidateCheck::Usable(RecoveryCandidate {
            path: candidate.path.clone(),
            label: candidate.label.clone(),
            config,
            raw,
        }),
        Err(issues) => CandidateCheck::Unusable(format!(
            "{} validation issue(s), first: {}: {}",
            issues.len(),
            issues.first().map(|i| i.display_path()).unwrap_or("<root>"),
            issues.first().map(|i| i.message.as_str()).unwrap_or("-")
        )),
    }
}

pub fn find_valid_backup<V: ConfigValidator>(
    fs: &dyn ConfigFs,
    validator: &V,
    config_path: &Path,
    retention: usize,
) -> Option<RecoveryCandidate<V::Config>> {
    for slot in backup_candidates(config_path, retention) {
        match validate_candidate(fs, validator, &slot) {
            CandidateCheck::Missing => continue,
            CandidateCheck::Unusable(why) => {
                debug!(backup = %slot.path.display(), reason = %why, "skipping backup");
            }
            CandidateCheck::Usable(c) => return Some(c),
        }
    }
    None
}

pub fn recover_config_from_backup<V: ConfigValidator>(
    fs: &dyn ConfigFs,
    validator: &V,
    config_path: &Path,
    retention: usize,
) -> RecoveryResult<V::Config> {
    let mut backups_checked = 0usize;
    let mut last_restore_error = None::<String>;

    for slot in backup_candidates(config_path, retention) {
        let candidate = match validate_candidate(fs, validator, &slot) {
            CandidateCheck::Missing => continue,
            CandidateCheck::Unusable(why) => {
                backups_checked += 1;
                debug!(backup = %slot.path.display(), reason = %why, "skipping backup");
                continue;
            }
            CandidateCheck::Usable(c) => {
                backups_checked += 1;
                c
            }
        };

        match promote(fs, config_path, &candidate) {
            Ok(quarantine_path) => {
                info!(
                    config = %config_path.display(),
                    backup = %candidate.path.display(),
                    label = %candidate.label,
                    backups_checked,
                    "restored config from backup"
                );
                return RecoveryResult::Recovered {
                    candidate,
                    backups_checked,
                    quarantine_path,
                };
            }
            Err(e) => {
                warn!(
                    config = %config_path.display(),
                    backup = %candidate.path.display(),
                    error = %e,
                    "restoring from backup failed; trying next slot"
                );
                last_restore_error = Some(e.to_string());
            }
        }
    }

    let reason = match (backups_checked, last_restore_error) {
        (0, _) => "no backup files found".to_string(),
        (n, Some(err)) => format!("{n} backup file(s) checked; restoring failed: {err}"),
        (n, None) => format!("all {n} backup file(s) were invalid or unreadable"),
    };
    debug!(config = %config_path.display(), backups_checked, %reason, "config recovery failed");
    RecoveryResult::Failed {
        backups_checked,
        reason,
    }
}

fn promote<C>(
    fs: &dyn ConfigFs,
    config_path: &Path,
    candidate: &RecoveryCandidate<C>,
) -> Result<Option<PathBuf>> {
    let staging = staging_path(config_path);
    let outcome = stage_and_swap(fs, config_path, candidate, &staging);
    if fs.exists(&staging) {
        if let Err(e) = fs.remove_file(&staging) {
            debug!(staging = %staging.display(), error = %e, "failed to remove staged restore");
        }
    }
    outcome
}

fn stage_and_swap<C>(
    fs: &dyn ConfigFs,
    config_path: &Path,
    candidate: &RecoveryCandidate<C>,
    staging: &Path,
) -> Result<Option<PathBuf>> {
    fs.copy(&candidate.path, staging)?;
    let staged = fs.read_to_string(staging)?;
    if staged != candidate.raw {
        return Err(Error::msg(format!(
            "staged copy {} does not match backup {}",
            staging.display(),
            candidate.path.display()
        )));
    }

    let quarantine = if fs.exists(config_path) {
        let q = quarantine_path(config_path);
        move_or_copy(fs, config_path, &q)?;
        Some(q)
    } else {
        None
    };

    if let Err(e) = move_or_copy(fs, staging, config_path) {
        if let Some(q) = &quarantine {
            if let Err(restore_err) = move_or_copy(fs, q, config_path) {
                return Err(Error::msg(format!(
                    "{e}; putting {} back also failed: {restore_err}",
                    q.display()
                )));
            }
        }
        return Err(e);
    }
    Ok(quarantine)
}

// Rename first; a rename can fail across devices, so fall back to copying.
fn move_or_copy(fs: &dyn ConfigFs, from: &Path, to: &Path) -> Result<()> {
    match fs.rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(from = %from.display(), to = %to.display(), error = %e, "rename failed, copying");
            fs.copy(from, to)
        }
    }
}
