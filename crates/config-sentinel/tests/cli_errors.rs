use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn sentinel(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sentinel"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("SENTINEL_CONFIG")
        .env_remove("SENTINEL_BACKUPS")
        .env_remove("SENTINEL_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("run sentinel")
}

#[test]
fn blocked_write_prints_one_violation_per_line() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.json");
    let proposal = tmp.path().join("proposal.json");
    let original = r#"{ "agents": {}, "gateway": {}, "models": {} }"#;
    fs::write(&cfg, original).expect("seed config");
    fs::write(&proposal, r#"{ "ui": {} }"#).expect("seed proposal");

    let out = sentinel(&cfg, &["write", proposal.to_str().expect("utf-8 path")]);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert_eq!(out.status.code(), Some(1), "stderr: {stderr}");
    assert!(
        stderr.contains("error: Config write blocked (2 issues):\n  1. "),
        "stderr: {stderr}"
    );
    assert!(stderr.contains("\n  2. "), "stderr: {stderr}");
    assert!(!stderr.contains("Error {"), "stderr: {stderr}");
    assert!(!stderr.contains("\\n"), "stderr: {stderr}");
    assert_eq!(fs::read_to_string(&cfg).expect("read config"), original);
}

#[test]
fn check_write_failure_exits_nonzero_with_plain_message() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = tmp.path().join("config.json");
    let proposal = tmp.path().join("proposal.json");
    fs::write(&cfg, r#"{ "agents": {}, "gateway": {} }"#).expect("seed config");
    fs::write(&proposal, r#"{ "agents": {} }"#).expect("seed proposal");

    let out = sentinel(&cfg, &["check-write", proposal.to_str().expect("utf-8 path")]);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert_eq!(out.status.code(), Some(1), "stderr: {stderr}");
    assert!(
        stderr.contains("error: Config write blocked: the new config would remove critical section(s): gateway."),
        "stderr: {stderr}"
    );
}
