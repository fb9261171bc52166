pub mod cancel;
pub mod retry;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use tracing::info;

use crate::models::common::Config;

/// Parses an RPC quantity: `0x`-prefixed hex or plain decimal.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

/// Serde helper for optional quantities given as hex strings, decimal strings or numbers.
pub fn deserialize_quantity<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid quantity: {}", n))),
        Some(Value::String(s)) => parse_quantity(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid quantity: {}", s))),
        Some(other) => Err(de::Error::custom(format!("invalid quantity: {}", other))),
    }
}

pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    // File first, then TX_DECODER__SECTION__KEY environment overrides
    let settings = config::Config::builder()
        .add_source(config::File::from(config_path).required(false))
        .add_source(
            config::Environment::with_prefix("TX_DECODER")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config")?;

    let config: Config = settings
        .try_deserialize()
        .context("failed to parse config")?;

    Ok(config)
}

pub(crate) fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        error.to_string()
    }
}
