use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::backups::rotate_backups;
use crate::error::{Error, Result};
use crate::fs::{ConfigFs, with_suffix};
use crate::guard::{
    META_KEY, WriteGuardOptions, WriteGuardResult, format_write_guard_error,
    validate_config_write_integrity,
};
use crate::parse::parse_config_text;

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub force: bool,
    pub retention: usize,
    /// Recorded as `meta.lastTouchedBy`.
    pub touched_by: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            force: false,
            retention: crate::backups::CONFIG_BACKUP_COUNT,
            touched_by: format!("sentinel {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub warnings: Vec<String>,
}

pub fn read_current_value(fs: &dyn ConfigFs, path: &Path) -> Option<Value> {
    if !fs.exists(path) {
        return None;
    }
    let raw = fs.read_to_string(path).ok()?;
    parse_config_text(&raw).ok()
}

pub fn write_config_file(
    fs: &dyn ConfigFs,
    path: &Path,
    proposed: &Value,
    options: &WriteOptions,
) -> Result<WriteReport> {
    let mut next = proposed.clone();
    stamp_meta(&mut next, &options.touched_by);

    let current = read_current_value(fs, path).unwrap_or(Value::Null);
    let guard = validate_config_write_integrity(
        &current,
        &next,
        WriteGuardOptions {
            force: options.force,
        },
    );
    let warnings = match guard {
        WriteGuardResult::Safe { warnings } => warnings,
        WriteGuardResult::Unsafe { violations, .. } => {
            return Err(Error::msg(format_write_guard_error(&violations)));
        }
    };

    let mut body = serde_json::to_string_pretty(&next)
        .map_err(|e| Error::msg(format!("failed to encode config: {e}")))?;
    body.push('\n');

    rotate_backups(fs, path, options.retention)?;

    let tmp = with_suffix(path, &format!(".tmp-{}", std::process::id()));
    fs.write(&tmp, &body)?;
    if let Err(e) = fs.rename(&tmp, path) {
        if let Err(cleanup) = fs.remove_file(&tmp) {
            debug!(tmp = %tmp.display(), error = %cleanup, "failed to remove temp config");
        }
        return Err(e);
    }
    info!(config = %path.display(), bytes = body.len(), "wrote config");
    Ok(WriteReport { warnings })
}

pub fn patch_config_key(
    fs: &dyn ConfigFs,
    path: &Path,
    key: &str,
    value: Value,
    options: &WriteOptions,
) -> Result<WriteReport> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::msg("config key must not be empty"));
    }
    let mut next = match read_current_value(fs, path) {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(Error::msg(format!(
                "cannot patch {}: config root is not an object",
                path.display()
            )));
        }
        None if fs.exists(path) => {
            return Err(Error::msg(format!(
                "cannot patch {}: existing file does not parse; run `sentinel doctor` first",
                path.display()
            )));
        }
        None => Map::new(),
    };
    debug!(key, "patching config key");
    next.insert(key.to_string(), value);
    write_config_file(fs, path, &Value::Object(next), options)
}

fn stamp_meta(config: &mut Value, touched_by: &str) {
    let Some(root) = config.as_object_mut() else {
        return;
    };
    let meta = root
        .entry(META_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Some(meta) = meta.as_object_mut() {
        meta.insert(
            "lastTouchedAt".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        meta.insert("lastTouchedBy".into(), Value::String(touched_by.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use serde_json::json;

    const CFG: &str = "/w/config.json";

    fn opts() -> WriteOptions {
        WriteOptions {
            retention: 3,
            touched_by: "test".into(),
            ..WriteOptions::default()
        }
    }

    #[test]
    fn first_write_creates_file_without_backup() {
        let fs = MemFs::new();
        let p = Path::new(CFG);
        write_config_file(&fs, p, &json!({ "gateway": {} }), &opts()).expect("write");
        let v = read_current_value(&fs, p).expect("value");
        assert_eq!(v["meta"]["lastTouchedBy"], json!("test"));
        assert!(v["meta"]["lastTouchedAt"].is_string());
        assert!(!fs.exists(Path::new("/w/config.json.bak")));
        assert!(!fs.exists(Path::new(&format!("/w/config.json.tmp-{}", std::process::id()))));
    }

    #[test]
    fn second_write_rotates_previous_into_bak() {
        let fs = MemFs::new();
        let p = Path::new(CFG);
        write_config_file(&fs, p, &json!({ "gateway": { "mode": "a" } }), &opts()).expect("w1");
        let first = fs.get(p).expect("first");
        write_config_file(&fs, p, &json!({ "gateway": { "mode": "b" } }), &opts()).expect("w2");
        assert_eq!(fs.get(Path::new("/w/config.json.bak")), Some(first));
    }

    #[test]
    fn destructive_write_is_blocked_and_file_untouched() {
        let fs = MemFs::new();
        let p = Path::new(CFG);
        fs.insert(CFG, r#"{ "agents": {}, "gateway": {}, "models": {} }"#);
        let err = write_config_file(&fs, p, &json!({ "ui": {} }), &opts())
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Config write blocked"), "unexpected err: {err}");
        assert_eq!(
            fs.get(p).as_deref(),
            Some(r#"{ "agents": {}, "gateway": {}, "models": {} }"#)
        );
        assert!(!fs.exists(Path::new("/w/config.json.bak")));
    }

    #[test]
    fn force_overrides_guard() {
        let fs = MemFs::new();
        let p = Path::new(CFG);
        fs.insert(CFG, r#"{ "agents": {}, "gateway": {}, "models": {} }"#);
        let options = WriteOptions {
            force: true,
            ..opts()
        };
        write_config_file(&fs, p, &json!({ "ui": {} }), &options).expect("forced write");
        assert!(fs.exists(Path::new("/w/config.json.bak")));
    }

    #[test]
    fn failed_swap_removes_temp_file_and_keeps_primary() {
        let fs = MemFs::new();
        let p = Path::new(CFG);
        fs.insert(CFG, r#"{ "gateway": {} }"#);
        let tmp = format!("/w/config.json.tmp-{}", std::process::id());
        fs.fail_rename_from(tmp.as_str());

        let (result, levels) = crate::logging::capture_levels(|| {
            write_config_file(&fs, p, &json!({ "gateway": { "mode": "x" } }), &opts())
        });
        assert!(result.is_err());
        assert!(!fs.exists(Path::new(&tmp)));
        assert_eq!(fs.get(p).as_deref(), Some(r#"{ "gateway": {} }"#));
        assert!(levels.iter().all(|l| *l > tracing::Level::WARN), "{levels:?}");
    }

    #[test]
    fn patch_keeps_other_sections() {
        let fs = MemFs::new();
        let p = Path::new(CFG);
        fs.insert(CFG, r#"{ agents: { list: [] }, gateway: { mode: "local" } }"#);
        patch_config_key(&fs, p, "gateway", json!({ "mode": "remote" }), &opts()).expect("patch");
        let v = read_current_value(&fs, p).expect("value");
        assert_eq!(v["gateway"]["mode"], json!("remote"));
        assert_eq!(v["agents"]["list"], json!([]));
    }

    #[test]
    fn patch_refuses_unparseable_file() {
        let fs = MemFs::new();
        fs.insert(CFG, "{ broken");
        let err = patch_config_key(&fs, Path::new(CFG), "ui", json!({}), &opts())
            .unwrap_err()
            .to_string();
        assert!(err.contains("does not parse"), "unexpected err: {err}");
    }

    #[test]
    fn non_object_meta_is_replaced() {
        let mut v = json!({ "meta": 3 });
        stamp_meta(&mut v, "x");
        assert_eq!(v["meta"]["lastTouchedBy"], json!("x"));
    }
}
