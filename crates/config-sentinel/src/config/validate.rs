use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{ConfigIssue, ConfigValidator};
use crate::guard::{CRITICAL_KEYS, META_KEY};

pub const KNOWN_SECTIONS: &[&str] = &[
    META_KEY,
    "$schema",
    "env",
    "logging",
    "ui",
    "hooks",
    "cron",
    "memory",
    "browser",
    "update",
    "wizard",
    "diagnostics",
];

pub const LEGACY_KEYS: &[(&str, &str)] = &[
    ("routing", "agents.routing"),
    ("identity", "agents.identity"),
    ("agent", "agents.defaults"),
    ("provider", "models.providers"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    pub agent_ids: Vec<String>,
    pub gateway_port: Option<u16>,
    pub sections: Vec<String>,
    pub value: Value,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AgentConfigValidator;

impl ConfigValidator for AgentConfigValidator {
    type Config = AgentConfig;

    fn validate(&self, raw: &Value) -> std::result::Result<AgentConfig, Vec<ConfigIssue>> {
        let Some(root) = raw.as_object() else {
            return Err(vec![ConfigIssue::new("", "config root must be an object")]);
        };

        let mut issues = Vec::new();
        for (key, value) in root {
            let known = CRITICAL_KEYS.contains(&key.as_str())
                || KNOWN_SECTIONS.contains(&key.as_str());
            if !known {
                issues.push(ConfigIssue::new(key.as_str(), "unrecognized key"));
                continue;
            }
            if key == "$schema" {
                if !value.is_string() {
                    issues.push(ConfigIssue::new(key.as_str(), "expected a string"));
                }
                continue;
            }
            if !value.is_object() {
                issues.push(ConfigIssue::new(key.as_str(), "expected an object"));
            }
        }

        let agent_ids = match root.get("agents").and_then(Value::as_object) {
            Some(agents) => validate_agent_list(agents, &mut issues),
            None => Vec::new(),
        };
        let gateway_port = match root.get("gateway").and_then(Value::as_object) {
            Some(gateway) => validate_gateway_port(gateway, &mut issues),
            None => None,
        };

        if !issues.is_empty() {
            return Err(issues);
        }
        Ok(AgentConfig {
            agent_ids,
            gateway_port,
            sections: root.keys().cloned().collect(),
            value: raw.clone(),
        })
    }

    fn legacy_issues(&self, raw: &Value) -> Vec<ConfigIssue> {
        let Some(root) = raw.as_object() else {
            return Vec::new();
        };
        LEGACY_KEYS
            .iter()
            .filter(|(key, _)| root.contains_key(*key))
            .map(|(key, target)| {
                ConfigIssue::new(*key, format!("legacy key; its content now lives in `{target}`"))
            })
            .collect()
    }
}

fn validate_agent_list(
    agents: &Map<String, Value>,
    issues: &mut Vec<ConfigIssue>,
) -> Vec<String> {
    let Some(list) = agents.get("list") else {
        return Vec::new();
    };
    let Some(list) = list.as_array() else {
        issues.push(ConfigIssue::new("agents.list", "expected an array"));
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    for (i, entry) in list.iter().enumerate() {
        let path = format!("agents.list.{i}.id");
        let id = entry
            .as_object()
            .and_then(|e| e.get("id"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if id.is_empty() {
            issues.push(ConfigIssue::new(
                path,
                "agent entry requires a non-empty string id",
            ));
            continue;
        }
        if !seen.insert(id.to_string()) {
            issues.push(ConfigIssue::new(path, format!("duplicate agent id '{id}'")));
            continue;
        }
        ids.push(id.to_string());
    }
    ids
}

fn validate_gateway_port(
    gateway: &Map<String, Value>,
    issues: &mut Vec<ConfigIssue>,
) -> Option<u16> {
    let raw = gateway.get("port")?;
    // JSON5 may hand integers back as floats.
    let port = raw
        .as_u64()
        .or_else(|| {
            raw.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .filter(|p| (1..=u64::from(u16::MAX)).contains(p));
    match port {
        Some(p) => u16::try_from(p).ok(),
        None => {
            issues.push(ConfigIssue::new(
                "gateway.port",
                "expected an integer between 1 and 65535",
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object_root() {
        let issues = AgentConfigValidator.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(issues[0].path, "");
    }

    #[test]
    fn rejects_unknown_and_mistyped_sections() {
        let issues = AgentConfigValidator
            .validate(&json!({ "gateway": "on", "bogus": {} }))
            .unwrap_err();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"gateway"));
        assert!(paths.contains(&"bogus"));
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let issues = AgentConfigValidator
            .validate(&json!({ "agents": { "list": [{ "id": "a" }, { "id": "a" }] } }))
            .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("duplicate agent id"));
    }

    #[test]
    fn port_out_of_range_is_an_issue() {
        let issues = AgentConfigValidator
            .validate(&json!({ "gateway": { "port": 70000 } }))
            .unwrap_err();
        assert_eq!(issues[0].path, "gateway.port");
    }

    #[test]
    fn accepts_float_encoded_port() {
        let cfg = AgentConfigValidator
            .validate(&json!({ "gateway": { "port": 18789.0 } }))
            .expect("valid");
        assert_eq!(cfg.gateway_port, Some(18789));
    }

    #[test]
    fn legacy_keys_listed_in_table_order() {
        let issues = AgentConfigValidator.legacy_issues(&json!({ "provider": {}, "routing": {} }));
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["routing", "provider"]);
    }
}
