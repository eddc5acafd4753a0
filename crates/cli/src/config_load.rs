//! Config loading: TOML or YAML by extension, unknown keys logged and
//! ignored, deprecated aliases warned once.

use std::path::Path;

use anyhow::Context;

use axe_domain::config::{scan_keys, Config, ConfigSeverity};

/// Load, key-check, deserialize, and validate a config file.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config '{}'", path.display()))?;

    let doc: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&raw).with_context(|| "parsing YAML config")?
        }
        _ => {
            let value: toml::Value = toml::from_str(&raw).with_context(|| "parsing TOML config")?;
            serde_json::to_value(value).with_context(|| "normalizing TOML config")?
        }
    };

    let scan = scan_keys(&doc);
    for key in &scan.unknown {
        tracing::warn!(key, "unknown config key ignored");
    }
    for key in &scan.deprecated {
        tracing::warn!(key, "deprecated config key accepted");
    }

    let config: Config =
        serde_json::from_value(doc).with_context(|| "deserializing config")?;

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }
    Ok(config)
}
