use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Top-level sections whose disappearance is presumed destructive.
pub const CRITICAL_KEYS: &[&str] = &[
    "agents", "gateway", "models", "channels", "auth", "plugins", "tools", "skills", "session",
    "messages", "commands",
];

pub const META_KEY: &str = "meta";

pub const MIN_KEYS_FOR_RATIO_CHECK: usize = 3;
pub const MIN_RETENTION_RATIO: f64 = 0.4;
pub const MIN_BYTES_FOR_SIZE_CHECK: usize = 512;
pub const MIN_SIZE_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationCode {
    DroppedCriticalKeys,
    ExcessiveKeyLoss,
    ExcessiveSizeDrop,
}

impl ViolationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DroppedCriticalKeys => "dropped-critical-keys",
            Self::ExcessiveKeyLoss => "excessive-key-loss",
            Self::ExcessiveSizeDrop => "excessive-size-drop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationDetails {
    DroppedKeys {
        keys: Vec<String>,
    },
    KeyLoss {
        current_keys: usize,
        retained_keys: usize,
        retention_ratio: f64,
    },
    SizeDrop {
        current_bytes: usize,
        proposed_bytes: usize,
        size_ratio: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteGuardViolation {
    pub code: ViolationCode,
    pub message: String,
    pub details: Option<ViolationDetails>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteGuardOptions {
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteGuardResult {
    Safe {
        warnings: Vec<String>,
    },
    Unsafe {
        violations: Vec<WriteGuardViolation>,
        warnings: Vec<String>,
    },
}

impl WriteGuardResult {
    fn safe() -> Self {
        Self::Safe {
            warnings: Vec::new(),
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe { .. })
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Safe { warnings } | Self::Unsafe { warnings, .. } => warnings,
        }
    }

    pub fn violations(&self) -> &[WriteGuardViolation] {
        match self {
            Self::Safe { .. } => &[],
            Self::Unsafe { violations, .. } => violations,
        }
    }
}

pub fn validate_config_write_integrity(
    current: &Value,
    proposed: &Value,
    options: WriteGuardOptions,
) -> WriteGuardResult {
    if options.force {
        return WriteGuardResult::safe();
    }
    let (Some(cur), Some(next)) = (current.as_object(), proposed.as_object()) else {
        return WriteGuardResult::safe();
    };

    let mut violations = Vec::new();
    violations.extend(check_dropped_critical_keys(cur, next));
    violations.extend(check_key_loss(cur, next));
    violations.extend(check_size_drop(current, proposed));

    let warnings = dropped_key_warnings(cur, next);
    if violations.is_empty() {
        return WriteGuardResult::Safe { warnings };
    }

    for v in &violations {
        debug!(code = v.code.as_str(), message = %v.message, "config write guard violation");
    }
    WriteGuardResult::Unsafe {
        violations,
        warnings,
    }
}

fn check_dropped_critical_keys(
    cur: &Map<String, Value>,
    next: &Map<String, Value>,
) -> Option<WriteGuardViolation> {
    let dropped: Vec<String> = CRITICAL_KEYS
        .iter()
        .filter(|k| cur.contains_key(**k) && !next.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    if dropped.is_empty() {
        return None;
    }
    Some(WriteGuardViolation {
        code: ViolationCode::DroppedCriticalKeys,
        message: format!(
            "the new config would remove critical section(s): {}. Patch individual keys \
             (`sentinel set <key> <json>`) instead of replacing the whole file, or pass \
             --force if the replacement is intentional.",
            dropped.join(", ")
        ),
        details: Some(ViolationDetails::DroppedKeys { keys: dropped }),
    })
}

fn check_key_loss(
    cur: &Map<String, Value>,
    next: &Map<String, Value>,
) -> Option<WriteGuardViolation> {
    let current_keys = cur.len();
    if current_keys < MIN_KEYS_FOR_RATIO_CHECK {
        return None;
    }
    let retained_keys = cur.keys().filter(|k| next.contains_key(*k)).count();
    let retention_ratio = retained_keys as f64 / current_keys as f64;
    if retention_ratio >= MIN_RETENTION_RATIO {
        return None;
    }
    Some(WriteGuardViolation {
        code: ViolationCode::ExcessiveKeyLoss,
        message: format!(
            "the new config keeps only {retained_keys} of {current_keys} top-level keys \
             ({:.0}% retained, minimum {:.0}%).",
            retention_ratio * 100.0,
            MIN_RETENTION_RATIO * 100.0
        ),
        details: Some(ViolationDetails::KeyLoss {
            current_keys,
            retained_keys,
            retention_ratio,
        }),
    })
}

fn check_size_drop(current: &Value, proposed: &Value) -> Option<WriteGuardViolation> {
    let current_bytes = serialized_len(current);
    if current_bytes < MIN_BYTES_FOR_SIZE_CHECK {
        return None;
    }
    let proposed_bytes = serialized_len(proposed);
    let size_ratio = proposed_bytes as f64 / current_bytes as f64;
    if size_ratio >= MIN_SIZE_RATIO {
        return None;
    }
    Some(WriteGuardViolation {
        code: ViolationCode::ExcessiveSizeDrop,
        message: format!(
            "the new config would shrink from {current_bytes} to {proposed_bytes} bytes \
             ({:.0}% of the current size, minimum {:.0}%).",
            size_ratio * 100.0,
            MIN_SIZE_RATIO * 100.0
        ),
        details: Some(ViolationDetails::SizeDrop {
            current_bytes,
            proposed_bytes,
            size_ratio,
        }),
    })
}

fn dropped_key_warnings(cur: &Map<String, Value>, next: &Map<String, Value>) -> Vec<String> {
    let critical: BTreeSet<&str> = CRITICAL_KEYS.iter().copied().collect();
    let dropped: Vec<&str> = cur
        .keys()
        .map(String::as_str)
        .filter(|k| !next.contains_key(*k) && !critical.contains(k) && *k != META_KEY)
        .collect();
    if dropped.is_empty() {
        return Vec::new();
    }
    vec![format!(
        "non-critical top-level key(s) will be removed: {}",
        dropped.join(", ")
    )]
}

// Compact JSON length; serializing a `Value` only fails for non-string map keys,
// which a `Value` cannot hold.
fn serialized_len(v: &Value) -> usize {
    serde_json::to_string(v).map(|s| s.len()).unwrap_or(0)
}

pub fn format_write_guard_error(violations: &[WriteGuardViolation]) -> String {
    match violations {
        [] => String::new(),
        [only] => format!("Config write blocked: {}", only.message),
        many => {
            let mut out = format!("Config write blocked ({} issues):", many.len());
            for (i, v) in many.iter().enumerate() {
                out.push_str(&format!("\n  {}. {}", i + 1, v.message));
            }
            out
        }
    }
}
