use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

pub trait ConfigFs {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, body: &str) -> Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl ConfigFs for RealFs {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))
    }

    fn write(&self, path: &Path, body: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;
        }
        fs::write(path, body)
            .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to).map_err(|e| {
            Error::msg(format!(
                "failed to copy {} -> {}: {e}",
                from.display(),
                to.display()
            ))
        })?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| {
            Error::msg(format!(
                "failed to rename {} -> {}: {e}",
                from.display(),
                to.display()
            ))
        })
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::msg(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

/// In-memory filesystem with per-path failure injection.
#[derive(Debug, Default)]
pub struct MemFs {
    files: Mutex<BTreeMap<PathBuf, String>>,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    // Keyed by source path.
    rename_from: BTreeSet<PathBuf>,
    // Keyed by destination path.
    copy_to: BTreeSet<PathBuf>,
    // Keyed by source path.
    copy_from: BTreeSet<PathBuf>,
    read: BTreeSet<PathBuf>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, body: impl Into<String>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into(), body.into());
        }
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn fail_rename_from(&self, path: impl Into<PathBuf>) {
        if let Ok(mut f) = self.faults.lock() {
            f.rename_from.insert(path.into());
        }
    }

    pub fn fail_copy_to(&self, path: impl Into<PathBuf>) {
        if let Ok(mut f) = self.faults.lock() {
            f.copy_to.insert(path.into());
        }
    }

    pub fn fail_copy_from(&self, path: impl Into<PathBuf>) {
        if let Ok(mut f) = self.faults.lock() {
            f.copy_from.insert(path.into());
        }
    }

    pub fn fail_read_of(&self, path: impl Into<PathBuf>) {
        if let Ok(mut f) = self.faults.lock() {
            f.read.insert(path.into());
        }
    }

    fn faulted(&self, pick: impl Fn(&Faults) -> bool) -> bool {
        self.faults.lock().map(|f| pick(&f)).unwrap_or(false)
    }

    fn with_files<T>(
        &self,
        op: impl FnOnce(&mut BTreeMap<PathBuf, String>) -> Result<T>,
    ) -> Result<T> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| Error::msg("in-memory filesystem lock poisoned"))?;
        op(&mut files)
    }
}

impl ConfigFs for MemFs {
    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        if self.faulted(|f| f.read.contains(path)) {
            return Err(Error::msg(format!(
                "failed to read {}: injected fault",
                path.display()
            )));
        }
        self.with_files(|files| {
            files
                .get(path)
                .cloned()
                .ok_or_else(|| Error::msg(format!("failed to read {}: not found", path.display())))
        })
    }

    fn write(&self, path: &Path, body: &str) -> Result<()> {
        self.with_files(|files| {
            files.insert(path.to_path_buf(), body.to_string());
            Ok(())
        })
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if self.faulted(|f| f.copy_to.contains(to) || f.copy_from.contains(from)) {
            return Err(Error::msg(format!(
                "failed to copy {} -> {}: injected fault",
                from.display(),
                to.display()
            )));
        }
        self.with_files(|files| {
            let body = files.get(from).cloned().ok_or_else(|| {
                Error::msg(format!(
                    "failed to copy {} -> {}: source not found",
                    from.display(),
                    to.display()
                ))
            })?;
            files.insert(to.to_path_buf(), body);
            Ok(())
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if self.faulted(|f| f.rename_from.contains(from)) {
            return Err(Error::msg(format!(
                "failed to rename {} -> {}: injected fault (cross-device)",
                from.display(),
                to.display()
            )));
        }
        self.with_files(|files| {
            let body = files.remove(from).ok_or_else(|| {
                Error::msg(format!(
                    "failed to rename {} -> {}: source not found",
                    from.display(),
                    to.display()
                ))
            })?;
            files.insert(to.to_path_buf(), body);
            Ok(())
        })
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.with_files(|files| {
            files.remove(path);
            Ok(())
        })
    }
}

pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}
