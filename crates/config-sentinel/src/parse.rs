use serde_json::Value;

use crate::error::{Error, Result};

pub fn parse_config_text(raw: &str) -> Result<Value> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    if raw.trim().is_empty() {
        return Err(Error::msg("config text is empty"));
    }
    Ok(json5::from_str::<Value>(raw)?)
}
