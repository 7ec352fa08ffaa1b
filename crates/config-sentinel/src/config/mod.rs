use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::fs::ConfigFs;
use crate::parse::parse_config_text;

mod validate;

pub use validate::{AgentConfig, AgentConfigValidator, KNOWN_SECTIONS, LEGACY_KEYS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    /// Dotted key path, empty for the document root.
    pub path: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn display_path(&self) -> &str {
        if self.path.is_empty() {
            "<root>"
        } else {
            &self.path
        }
    }
}

pub trait ConfigValidator {
    type Config: Clone;

    fn validate(&self, raw: &Value) -> std::result::Result<Self::Config, Vec<ConfigIssue>>;

    fn legacy_issues(&self, _raw: &Value) -> Vec<ConfigIssue> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigSnapshot<C> {
    pub path: PathBuf,
    pub exists: bool,
    pub raw: Option<String>,
    pub parsed: Option<Value>,
    pub valid: bool,
    pub config: Option<C>,
    pub issues: Vec<ConfigIssue>,
    pub legacy_issues: Vec<ConfigIssue>,
}

impl<C> ConfigSnapshot<C> {
    fn missing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: false,
            raw: None,
            parsed: None,
            valid: true,
            config: None,
            issues: Vec::new(),
            legacy_issues: Vec::new(),
        }
    }

    fn invalid(path: &Path, raw: Option<String>, issue: ConfigIssue) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: true,
            raw,
            parsed: None,
            valid: false,
            config: None,
            issues: vec![issue],
            legacy_issues: Vec::new(),
        }
    }

    pub fn needs_attention(&self) -> bool {
        self.exists && !self.valid
    }
}

pub struct ConfigReader<'a, V> {
    fs: &'a dyn ConfigFs,
    validator: &'a V,
    path: PathBuf,
}

impl<'a, V: ConfigValidator> ConfigReader<'a, V> {
    pub fn new(fs: &'a dyn ConfigFs, validator: &'a V, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            validator,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fs(&self) -> &'a dyn ConfigFs {
        self.fs
    }

    pub fn validator(&self) -> &'a V {
        self.validator
    }

    pub fn read_snapshot(&self) -> ConfigSnapshot<V::Config> {
        let path = self.path.as_path();
        if !self.fs.exists(path) {
            return ConfigSnapshot::missing(path);
        }

        let raw = match self.fs.read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                return ConfigSnapshot::invalid(path, None, ConfigIssue::new("", e.to_string()));
            }
        };

        let parsed = match parse_config_text(&raw) {
            Ok(v) => v,
            Err(e) => {
                let issue = ConfigIssue::new("", e.to_string());
                return ConfigSnapshot::invalid(path, Some(raw), issue);
            }
        };

        let legacy_issues = self.validator.legacy_issues(&parsed);
        let (valid, config, issues) = match self.validator.validate(&parsed) {
            Ok(cfg) => (true, Some(cfg), Vec::new()),
            Err(issues) => (false, None, issues),
        };

        ConfigSnapshot {
            path: path.to_path_buf(),
            exists: true,
            raw: Some(raw),
            parsed: Some(parsed),
            valid,
            config,
            issues,
            legacy_issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    const PATH: &str = "/home/u/.sentinel/config.json";

    #[test]
    fn missing_file_is_not_invalid() {
        let fs = MemFs::new();
        let v = AgentConfigValidator;
        let snap = ConfigReader::new(&fs, &v, PATH).read_snapshot();
        assert!(!snap.exists);
        assert!(snap.valid);
        assert!(!snap.needs_attention());
    }

    #[test]
    fn unparseable_file_reports_root_issue() {
        let fs = MemFs::new();
        fs.insert(PATH, "{ gateway: ");
        let v = AgentConfigValidator;
        let snap = ConfigReader::new(&fs, &v, PATH).read_snapshot();
        assert!(snap.exists);
        assert!(!snap.valid);
        assert_eq!(snap.issues.len(), 1);
        assert_eq!(snap.issues[0].display_path(), "<root>");
        assert_eq!(snap.raw.as_deref(), Some("{ gateway: "));
    }

    #[test]
    fn valid_file_carries_typed_config() {
        let fs = MemFs::new();
        fs.insert(PATH, r#"{ "agents": { "list": [{ "id": "main" }] } }"#);
        let v = AgentConfigValidator;
        let snap = ConfigReader::new(&fs, &v, PATH).read_snapshot();
        assert!(snap.valid, "issues: {:?}", snap.issues);
        let cfg = snap.config.expect("config");
        assert_eq!(cfg.agent_ids, vec!["main".to_string()]);
    }

    #[test]
    fn legacy_keys_are_reported_separately() {
        let fs = MemFs::new();
        fs.insert(PATH, r#"{ "routing": {} }"#);
        let v = AgentConfigValidator;
        let snap = ConfigReader::new(&fs, &v, PATH).read_snapshot();
        assert!(!snap.valid);
        assert_eq!(snap.legacy_issues.len(), 1);
        assert_eq!(snap.legacy_issues[0].path, "routing");
    }
}
