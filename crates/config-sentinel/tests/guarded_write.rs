use std::fs;

use serde_json::json;

use config_sentinel::backups::{backup_slot_path, inventory};
use config_sentinel::fs::RealFs;
use config_sentinel::write::{WriteOptions, patch_config_key, read_current_value, write_config_file};

fn options(retention: usize) -> WriteOptions {
    WriteOptions {
        retention,
        touched_by: "integration".into(),
        ..WriteOptions::default()
    }
}

#[test]
fn repeated_writes_rotate_and_drop_the_oldest() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.json");

    for mode in ["a", "b", "c", "d", "e"] {
        write_config_file(&RealFs, &cfg, &json!({ "gateway": { "mode": mode } }), &options(3))
            .expect("write");
    }

    let mode_of = |path: &std::path::Path| {
        let v = read_current_value(&RealFs, path).expect("parse");
        v["gateway"]["mode"].as_str().map(str::to_string)
    };
    assert_eq!(mode_of(&cfg).as_deref(), Some("e"));
    assert_eq!(mode_of(&backup_slot_path(&cfg, 0)).as_deref(), Some("d"));
    assert_eq!(mode_of(&backup_slot_path(&cfg, 1)).as_deref(), Some("c"));
    assert_eq!(mode_of(&backup_slot_path(&cfg, 2)).as_deref(), Some("b"));
    assert!(!backup_slot_path(&cfg, 3).exists());

    let slots = inventory(&RealFs, &cfg, 3);
    assert_eq!(slots.len(), 3);
    assert!(slots.iter().all(|s| s.sha256.is_some()));
}

#[test]
fn blocked_write_changes_nothing_on_disk() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.json");
    let original = "{\n  // keep me\n  agents: {}, gateway: {}, models: {}, ui: {}\n}\n";
    fs::write(&cfg, original).expect("seed");

    let err = write_config_file(&RealFs, &cfg, &json!({ "ui": {} }), &options(5))
        .expect_err("guard should block");
    let msg = err.to_string();
    assert!(msg.starts_with("Config write blocked"), "{msg}");

    assert_eq!(fs::read_to_string(&cfg).expect("read"), original);
    assert!(!backup_slot_path(&cfg, 0).exists());
    let leftovers = fs::read_dir(tmp.path()).expect("read_dir").count();
    assert_eq!(leftovers, 1);
}

#[test]
fn patch_reads_json5_and_writes_plain_json() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.json");
    fs::write(&cfg, "{ gateway: { mode: 'local', }, agents: {} }").expect("seed");

    let report = patch_config_key(&RealFs, &cfg, "ui", json!({ "theme": "dark" }), &options(5))
        .expect("patch");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let written = fs::read_to_string(&cfg).expect("read");
    let v: serde_json::Value = serde_json::from_str(&written).expect("strict json");
    assert_eq!(v["ui"]["theme"], json!("dark"));
    assert_eq!(v["gateway"]["mode"], json!("local"));
    assert_eq!(v["meta"]["lastTouchedBy"], json!("integration"));
    assert!(written.ends_with('\n'));
    assert_eq!(
        fs::read_to_string(backup_slot_path(&cfg, 0)).expect("bak"),
        "{ gateway: { mode: 'local', }, agents: {} }"
    );
}
