use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use config_sentinel::backups::{format_inventory, inventory};
use config_sentinel::config::{AgentConfigValidator, ConfigIssue, ConfigReader};
use config_sentinel::diagnostics::{StderrSink, sanitize_terminal_text};
use config_sentinel::fs::{ConfigFs, RealFs};
use config_sentinel::gate::{GateContext, StartupGate, ensure_config_ready_or_exit};
use config_sentinel::guard::{
    WriteGuardOptions, format_write_guard_error, validate_config_write_integrity,
};
use config_sentinel::logging::{Verbosity, init_subscriber};
use config_sentinel::migrate::{LegacyKeyMigrator, StateMigrator};
use config_sentinel::parse::parse_config_text;
use config_sentinel::recovery::find_valid_backup;
use config_sentinel::settings::{BACKUPS_ENV, CONFIG_ENV, Settings};
use config_sentinel::write::{
    WriteOptions, patch_config_key, read_current_value, write_config_file,
};
use config_sentinel::{Error, Result};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the config file
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// Number of rotated backups kept next to the config file
    #[arg(long, global = true, env = BACKUPS_ENV)]
    backups: Option<usize>,
    /// Debug-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a summary of the config file
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the config, list problems, and optionally migrate legacy keys
    Doctor {
        /// Apply legacy-key migrations
        #[arg(long)]
        fix: bool,
    },
    /// List rotated backups next to the config file
    Backups,
    /// Run the write guard for a proposed config without writing it
    CheckWrite {
        /// Proposed config (JSON or JSON5)
        file: PathBuf,
        /// Treat the replacement as intentional
        #[arg(long)]
        force: bool,
    },
    /// Replace the config file, guarded against destructive overwrites
    Write {
        /// Proposed config (JSON or JSON5)
        file: PathBuf,
        /// Treat the replacement as intentional
        #[arg(long)]
        force: bool,
    },
    /// Set one top-level key to a JSON value, keeping everything else
    Set { key: String, value: String },
    /// Gateway lifecycle commands
    Gateway {
        #[command(subcommand)]
        cmd: GatewayCommand,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum GatewayCommand {
    Status,
    Probe,
    Health,
    Discover,
    /// Send one request to a running gateway
    Call,
    Install,
    Uninstall,
    Start,
    Stop,
    Restart,
    /// Run the gateway in the foreground
    Run,
}

impl GatewayCommand {
    fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Probe => "probe",
            Self::Health => "health",
            Self::Discover => "discover",
            Self::Call => "call",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Run => "run",
        }
    }
}

fn command_path(cmd: &Command) -> Vec<&'static str> {
    match cmd {
        Command::Status { .. } => vec!["status"],
        Command::Doctor { .. } => vec!["doctor"],
        Command::Backups => vec!["backups"],
        Command::CheckWrite { .. } => vec!["check-write"],
        Command::Write { .. } => vec!["write"],
        Command::Set { .. } => vec!["set"],
        Command::Gateway { cmd } => vec!["gateway", cmd.name()],
    }
}

fn main() {
    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {}", sanitize_terminal_text(e.message()));
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    init_subscriber(Verbosity::from_flags(args.verbose, args.quiet));

    let settings = Settings::resolve(args.config.clone(), args.backups);
    let fs = RealFs;
    let validator = AgentConfigValidator;
    let sink = StderrSink;
    let write_opts = WriteOptions {
        retention: settings.backup_retention,
        ..WriteOptions::default()
    };

    let migrator = LegacyKeyMigrator::new(&fs, &settings.config_path, write_opts.clone());
    let reader = ConfigReader::new(&fs, &validator, &settings.config_path);
    let gate = StartupGate::new(reader, &migrator, &sink, settings.backup_retention);
    let mut ctx = GateContext::new();
    ensure_config_ready_or_exit(&gate, &mut ctx, &command_path(&args.cmd));

    let path = settings.config_path.as_path();
    match args.cmd {
        Command::Status { json } => cmd_status(&fs, path, json),
        Command::Doctor { fix } => cmd_doctor(&fs, path, &migrator, fix),
        Command::Backups => cmd_backups(&fs, path, settings.backup_retention),
        Command::CheckWrite { file, force } => cmd_check_write(&fs, path, &file, force),
        Command::Write { file, force } => {
            let proposed = read_proposed(&file)?;
            let options = WriteOptions {
                force,
                ..write_opts
            };
            let report = write_config_file(&fs, path, &proposed, &options)?;
            print_warnings(&report.warnings);
            println!("wrote {}", path.display());
            Ok(())
        }
        Command::Set { key, value } => {
            let value = parse_config_text(&value)
                .map_err(|e| e.context(format!("invalid value for '{key}'")))?;
            let report = patch_config_key(&fs, path, &key, value, &write_opts)?;
            print_warnings(&report.warnings);
            println!("set {key} in {}", path.display());
            Ok(())
        }
        Command::Gateway { cmd } => cmd_gateway(&fs, path, cmd),
    }
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    path: &'a Path,
    exists: bool,
    valid: bool,
    sections: Vec<String>,
    issues: &'a [ConfigIssue],
    legacy_issues: &'a [ConfigIssue],
}

fn cmd_status(fs: &dyn ConfigFs, path: &Path, json: bool) -> Result<()> {
    let snap = ConfigReader::new(fs, &AgentConfigValidator, path).read_snapshot();
    let report = StatusReport {
        path,
        exists: snap.exists,
        valid: snap.valid,
        sections: snap
            .config
            .as_ref()
            .map(|c| c.sections.clone())
            .unwrap_or_default(),
        issues: &snap.issues,
        legacy_issues: &snap.legacy_issues,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("config: {}", path.display());
    println!("exists: {}", report.exists);
    println!("valid: {}", report.valid);
    if !report.sections.is_empty() {
        println!("sections: {}", report.sections.join(", "));
    }
    print_issues("issues", report.issues);
    print_issues("legacy", report.legacy_issues);
    Ok(())
}

fn cmd_doctor(
    fs: &dyn ConfigFs,
    path: &Path,
    migrator: &dyn StateMigrator,
    fix: bool,
) -> Result<()> {
    if fix {
        let report = migrator.migrate(&|prompt| {
            println!("{prompt} yes");
            true
        })?;
        for key in &report.applied {
            println!("migrated legacy key: {key}");
        }
        for key in &report.skipped {
            println!("left legacy key in place (target already set): {key}");
        }
    }

    let snap = ConfigReader::new(fs, &AgentConfigValidator, path).read_snapshot();
    if !snap.exists {
        println!("no config file at {}", path.display());
        return Ok(());
    }
    if snap.valid {
        println!("config ok: {}", path.display());
        if !snap.legacy_issues.is_empty() {
            print_issues("legacy", &snap.legacy_issues);
            println!("run `sentinel doctor --fix` to migrate them");
        }
        return Ok(());
    }
    print_issues("issues", &snap.issues);
    print_issues("legacy", &snap.legacy_issues);
    if !fix && !snap.legacy_issues.is_empty() {
        println!("run `sentinel doctor --fix` to migrate legacy keys");
    }
    Err(Error::msg(format!(
        "config at {} is invalid and no usable backup was found",
        path.display()
    )))
}

fn cmd_backups(fs: &dyn ConfigFs, path: &Path, retention: usize) -> Result<()> {
    print!("{}", format_inventory(&inventory(fs, path, retention)));
    match find_valid_backup(fs, &AgentConfigValidator, path, retention) {
        Some(c) => println!("first usable backup: {} ({})", c.label, c.path.display()),
        None => println!("first usable backup: none"),
    }
    Ok(())
}

fn cmd_check_write(fs: &dyn ConfigFs, path: &Path, file: &Path, force: bool) -> Result<()> {
    let proposed = read_proposed(file)?;
    let current = read_current_value(fs, path).unwrap_or_default();
    let result =
        validate_config_write_integrity(&current, &proposed, WriteGuardOptions { force });
    print_warnings(result.warnings());
    if result.is_safe() {
        println!("write guard: ok");
        return Ok(());
    }
    Err(Error::msg(format_write_guard_error(result.violations())))
}

fn cmd_gateway(fs: &dyn ConfigFs, path: &Path, cmd: GatewayCommand) -> Result<()> {
    let snap = ConfigReader::new(fs, &AgentConfigValidator, path).read_snapshot();
    let port = snap
        .config
        .as_ref()
        .and_then(|c| c.gateway_port)
        .map(|p| p.to_string())
        .unwrap_or_else(|| "default".to_string());
    let state = if !snap.exists {
        "missing"
    } else if snap.valid {
        "valid"
    } else {
        "invalid"
    };
    println!("gateway {}: config {state}, port {port}", cmd.name());
    Ok(())
}

fn read_proposed(file: &Path) -> Result<serde_json::Value> {
    let raw = RealFs.read_to_string(file)?;
    parse_config_text(&raw).map_err(|e| e.context(format!("failed to parse {}", file.display())))
}

fn print_issues(title: &str, issues: &[ConfigIssue]) {
    for issue in issues {
        println!(
            "{title}: {}",
            sanitize_terminal_text(&format!("{}: {}", issue.display_path(), issue.message))
        );
    }
}

fn print_warnings(warnings: &[String]) {
    for w in warnings {
        println!("warning: {}", sanitize_terminal_text(w));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_sentinel::gate::{ALLOWED_INVALID_GATEWAY_SUBCOMMANDS, is_allowed_with_invalid_config};

    #[test]
    fn every_allowlisted_gateway_subcommand_parses() {
        for sub in ALLOWED_INVALID_GATEWAY_SUBCOMMANDS {
            let args = Args::try_parse_from(["sentinel", "gateway", *sub])
                .unwrap_or_else(|e| panic!("gateway {sub}: {e}"));
            let path = command_path(&args.cmd);
            assert_eq!(path, vec!["gateway", *sub]);
            assert!(is_allowed_with_invalid_config(&path));
        }
    }

    #[test]
    fn gateway_run_is_not_allowlisted() {
        let args = Args::try_parse_from(["sentinel", "gateway", "run"]).expect("parse");
        assert!(!is_allowed_with_invalid_config(&command_path(&args.cmd)));
    }
}
