use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::LEGACY_KEYS;
use crate::error::Result;
use crate::fs::ConfigFs;
use crate::write::{WriteOptions, read_current_value, write_config_file};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub declined: Vec<String>,
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.declined.is_empty() && self.skipped.is_empty()
    }
}

pub trait StateMigrator {
    fn migrate(&self, confirm: &dyn Fn(&str) -> bool) -> Result<MigrationReport>;
}

pub struct LegacyKeyMigrator<'a> {
    fs: &'a dyn ConfigFs,
    path: PathBuf,
    write: WriteOptions,
}

impl<'a> LegacyKeyMigrator<'a> {
    pub fn new(fs: &'a dyn ConfigFs, path: impl Into<PathBuf>, write: WriteOptions) -> Self {
        Self {
            fs,
            path: path.into(),
            write,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateMigrator for LegacyKeyMigrator<'_> {
    fn migrate(&self, confirm: &dyn Fn(&str) -> bool) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let Some(Value::Object(mut root)) = read_current_value(self.fs, &self.path) else {
            return Ok(report);
        };

        for (key, target) in LEGACY_KEYS {
            let Some(value) = root.get(*key).cloned() else {
                continue;
            };
            if dotted_get(&root, target).is_some() {
                debug!(key, target, "legacy key target already set; leaving it");
                report.skipped.push(key.to_string());
                continue;
            }
            if !confirm(&format!("Move legacy config key `{key}` to `{target}`?")) {
                report.declined.push(key.to_string());
                continue;
            }
            if dotted_insert(&mut root, target, value) {
                root.remove(*key);
                report.applied.push(key.to_string());
            } else {
                report.skipped.push(key.to_string());
            }
        }

        if !report.applied.is_empty() {
            write_config_file(self.fs, &self.path, &Value::Object(root), &self.write)?;
            info!(config = %self.path.display(), applied = ?report.applied, "migrated legacy config keys");
        }
        Ok(report)
    }
}

fn dotted_get<'v>(root: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut segs = path.split('.');
    let mut cur = root.get(segs.next()?)?;
    for seg in segs {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

// Creates intermediate objects; refuses to descend through non-object values.
fn dotted_insert(root: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    let segs: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segs.split_last() else {
        return false;
    };
    let mut cur = root;
    for seg in parents {
        let next = cur
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = next.as_object_mut() else {
            return false;
        };
        cur = obj;
    }
    cur.insert(last.to_string(), value);
    true
}
