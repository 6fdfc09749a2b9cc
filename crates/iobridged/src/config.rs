//! Configuration file handling for iobridged

use std::path::Path;

use anyhow::{bail, Context, Result};
use iobridge_core::{BridgeConfig, TransportKind};

/// Load a bridge configuration; `.json` files are JSON, anything else TOML
pub fn load(path: &Path) -> Result<BridgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Configuration used with `--mock` and no file: 8 inputs, 8 outputs,
/// simulated controller with outputs wired back to inputs
pub fn demo() -> BridgeConfig {
    let mut config = BridgeConfig::new("iobridge", 8, 8);
    config.transport = TransportKind::Mock;
    config
}

/// Tracing filter directive for the configured level.
///
/// `-v` flags win over the file; level names are case-insensitive and the
/// older `WARNING`/`CRITICAL` spellings are accepted.
pub fn level_directive(verbose: u8, configured: Option<&str>) -> Result<&'static str> {
    match verbose {
        0 => {}
        1 => return Ok("debug"),
        _ => return Ok("trace"),
    }

    let Some(level) = configured.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok("info");
    };
    let directive = match level.to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        "OFF" => "off",
        other => bail!("unknown log level: {}", other),
    };
    Ok(directive)
}
