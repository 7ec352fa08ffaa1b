use tracing::{debug, info, warn};

use crate::config::{ConfigReader, ConfigSnapshot, ConfigValidator};
use crate::diagnostics::{DiagLevel, DiagnosticSink};
use crate::migrate::StateMigrator;
use crate::recovery::{RecoveryResult, recover_config_from_backup};

pub const ALLOWED_INVALID_COMMANDS: &[&str] = &["doctor", "logs", "health", "help", "status"];

pub const ALLOWED_INVALID_GATEWAY_SUBCOMMANDS: &[&str] = &[
    "status",
    "probe",
    "health",
    "discover",
    "call",
    "install",
    "uninstall",
    "start",
    "stop",
    "restart",
];

pub fn is_allowed_with_invalid_config(command_path: &[&str]) -> bool {
    match command_path {
        [] => false,
        ["gateway", sub, ..] => ALLOWED_INVALID_GATEWAY_SUBCOMMANDS.contains(sub),
        [primary, ..] => ALLOWED_INVALID_COMMANDS.contains(primary),
    }
}

pub fn should_migrate_state_from_path(command_path: &[&str]) -> bool {
    match command_path {
        [] => false,
        ["health" | "status" | "sessions" | "help", ..] => false,
        ["memory", "status", ..] => false,
        ["agent", ..] => false,
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Halt,
}

#[derive(Debug)]
pub struct GateContext<C> {
    cached_snapshot: Option<ConfigSnapshot<C>>,
    migration_ran: bool,
    cache_snapshots: bool,
}

impl<C> Default for GateContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> GateContext<C> {
    pub fn new() -> Self {
        Self {
            cached_snapshot: None,
            migration_ran: false,
            cache_snapshots: true,
        }
    }

    pub fn test_mode() -> Self {
        Self {
            cache_snapshots: false,
            ..Self::new()
        }
    }

    pub fn invalidate(&mut self) {
        self.cached_snapshot = None;
    }

    pub fn migration_ran(&self) -> bool {
        self.migration_ran
    }

    pub fn has_cached_snapshot(&self) -> bool {
        self.cached_snapshot.is_some()
    }
}

pub struct StartupGate<'a, V> {
    reader: ConfigReader<'a, V>,
    migrator: &'a dyn StateMigrator,
    sink: &'a dyn DiagnosticSink,
    retention: usize,
    program: &'a str,
}

impl<'a, V: ConfigValidator> StartupGate<'a, V> {
    pub fn new(
        reader: ConfigReader<'a, V>,
        migrator: &'a dyn StateMigrator,
        sink: &'a dyn DiagnosticSink,
        retention: usize,
    ) -> Self {
        Self {
            reader,
            migrator,
            sink,
            retention,
            program: "sentinel",
        }
    }

    pub fn with_program_name(mut self, program: &'a str) -> Self {
        self.program = program;
        self
    }

    pub fn ensure_config_ready(
        &self,
        ctx: &mut GateContext<V::Config>,
        command_path: &[&str],
    ) -> GateDecision {
        if !ctx.migration_ran && should_migrate_state_from_path(command_path) {
            ctx.migration_ran = true;
            self.run_migration();
        }

        let snapshot = self.snapshot(ctx);
        if !snapshot.needs_attention() {
            return GateDecision::Proceed;
        }

        let recovery = recover_config_from_backup(
            self.reader.fs(),
            self.reader.validator(),
            self.reader.path(),
            self.retention,
        );
        let (backups_checked, reason) = match recovery {
            RecoveryResult::Recovered {
                candidate,
                quarantine_path,
                ..
            } => {
                self.say(
                    DiagLevel::Info,
                    format!(
                        "Config file {} was invalid and has been restored from backup ({}).",
                        snapshot.path.display(),
                        candidate.label
                    ),
                );
                if let Some(q) = quarantine_path {
                    self.say(
                        DiagLevel::Info,
                        format!("The invalid file was kept at {}.", q.display()),
                    );
                }
                self.say(
                    DiagLevel::Info,
                    format!("Run `{} doctor` to review the restored config.", self.program),
                );
                ctx.invalidate();
                return GateDecision::Proceed;
            }
            RecoveryResult::Failed {
                backups_checked,
                reason,
            } => (backups_checked, reason),
        };

        self.report_invalid(&snapshot, backups_checked, &reason);

        if is_allowed_with_invalid_config(command_path) {
            debug!(command = %command_path.join(" "), "command allowed with invalid config");
            return GateDecision::Proceed;
        }
        self.say(
            DiagLevel::Error,
            format!(
                "Config invalid; refusing to run `{}`. Run `{} doctor` to repair it.",
                command_path.join(" "),
                self.program
            ),
        );
        GateDecision::Halt
    }

    fn snapshot(&self, ctx: &mut GateContext<V::Config>) -> ConfigSnapshot<V::Config> {
        if ctx.cache_snapshots {
            if let Some(cached) = &ctx.cached_snapshot {
                return cached.clone();
            }
        }
        let snapshot = self.reader.read_snapshot();
        if ctx.cache_snapshots {
            ctx.cached_snapshot = Some(snapshot.clone());
        }
        snapshot
    }

    fn run_migration(&self) {
        match self.migrator.migrate(&|_| false) {
            Ok(report) if report.is_empty() => debug!("state migration: nothing to do"),
            Ok(report) => info!(
                applied = ?report.applied,
                declined = ?report.declined,
                skipped = ?report.skipped,
                "state migration finished"
            ),
            Err(e) => warn!(error = %e, "state migration failed"),
        }
    }

    fn report_invalid(
        &self,
        snapshot: &ConfigSnapshot<V::Config>,
        backups_checked: usize,
        reason: &str,
    ) {
        self.say(DiagLevel::Error, "Config invalid".to_string());
        self.say(DiagLevel::Error, format!("File: {}", snapshot.path.display()));
        if !snapshot.issues.is_empty() {
            self.say(DiagLevel::Error, "Problem:".to_string());
            for issue in &snapshot.issues {
                self.say(
                    DiagLevel::Error,
                    format!("  - {}: {}", issue.display_path(), issue.message),
                );
            }
        }
        if !snapshot.legacy_issues.is_empty() {
            self.say(DiagLevel::Warn, "Legacy config keys detected:".to_string());
            for issue in &snapshot.legacy_issues {
                self.say(
                    DiagLevel::Warn,
                    format!("  - {}: {}", issue.display_path(), issue.message),
                );
            }
        }
        if backups_checked == 0 {
            self.say(DiagLevel::Info, "No backups available.".to_string());
        } else {
            self.say(
                DiagLevel::Info,
                format!("Checked {backups_checked} backup(s): {reason}."),
            );
        }
        self.say(DiagLevel::Info, format!("Run: {} doctor", self.program));
    }

    fn say(&self, level: DiagLevel, line: String) {
        self.sink.emit(level, &line);
    }
}

/// Binary entry point: exits the process with status 1 on [`GateDecision::Halt`].
pub fn ensure_config_ready_or_exit<V: ConfigValidator>(
    gate: &StartupGate<'_, V>,
    ctx: &mut GateContext<V::Config>,
    command_path: &[&str],
) {
    if gate.ensure_config_ready(ctx, command_path) == GateDecision::Halt {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_covers_diagnostic_commands() {
        for cmd in ALLOWED_INVALID_COMMANDS {
            assert!(is_allowed_with_invalid_config(&[*cmd]), "{cmd}");
        }
        assert!(!is_allowed_with_invalid_config(&["write"]));
        assert!(!is_allowed_with_invalid_config(&[]));
    }

    #[test]
    fn gateway_allowlist_is_per_subcommand() {
        assert!(is_allowed_with_invalid_config(&["gateway", "status"]));
        assert!(is_allowed_with_invalid_config(&["gateway", "restart"]));
        assert!(!is_allowed_with_invalid_config(&["gateway"]));
        assert!(!is_allowed_with_invalid_config(&["gateway", "run"]));
    }

    #[test]
    fn migration_trigger_skips_read_only_commands() {
        assert!(!should_migrate_state_from_path(&[]));
        assert!(!should_migrate_state_from_path(&["status"]));
        assert!(!should_migrate_state_from_path(&["memory", "status"]));
        assert!(!should_migrate_state_from_path(&["agent", "run"]));
        assert!(should_migrate_state_from_path(&["memory", "index"]));
        assert!(should_migrate_state_from_path(&["write"]));
    }

    #[test]
    fn context_invalidate_drops_cache() {
        let mut ctx = GateContext::<()>::new();
        assert!(!ctx.has_cached_snapshot());
        ctx.cached_snapshot = Some(ConfigSnapshot {
            path: "/x".into(),
            exists: false,
            raw: None,
            parsed: None,
            valid: true,
            config: None,
            issues: vec![],
            legacy_issues: vec![],
        });
        assert!(ctx.has_cached_snapshot());
        ctx.invalidate();
        assert!(!ctx.has_cached_snapshot());
    }
}
