mod agents;
mod github;
mod policy;
mod rate_limit;
mod session;
mod supervisor;
mod transcript;

pub use agents::*;
pub use github::*;
pub use policy::*;
pub use rate_limit::*;
pub use session::*;
pub use supervisor::*;
pub use transcript::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Root directory of the shared project workspace.
    #[serde(default)]
    pub workspace_root: PathBuf,
    /// Static agent roster for the session.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub policy: ToolPolicy,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unknown-key detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Section name → recognized keys.  `per_tool_timeouts` carries free-form
/// command names and is not descended into.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    (
        "session",
        &["time_budget_seconds", "token_budget_total"],
    ),
    (
        "policy",
        &[
            "allow_list",
            "deny_list",
            "forbidden_paths",
            "writable_paths",
            "sandbox_mode",
            "execution_timeout_seconds",
            "per_tool_timeouts",
            "max_output_bytes",
        ],
    ),
    (
        "supervisor",
        &[
            "work_hours_threshold",
            "token_threshold",
            "sleep_minutes",
            "degradation_score_threshold",
            "degradation_check_interval_turns",
            "break_max_concurrent_fraction",
            "break_per_hour",
            "break_max_minutes",
            "mailbox_path",
            "operator_public_key_path",
        ],
    ),
    ("rate_limit", &["rpm", "tpm"]),
    ("github", &["enabled", "branch_prefix"]),
    (
        "transcript",
        &[
            "window_tokens",
            "compression_high_water_tokens",
            "context_tokens",
            "context_window",
        ],
    ),
];

const KNOWN_TOP_LEVEL: &[&str] = &[
    "workspace_root",
    "agents",
    "session",
    "policy",
    "supervisor",
    "rate_limit",
    "github",
    "transcript",
];

const KNOWN_AGENT_KEYS: &[&str] = &["alias", "role", "model_ref", "default_system_prompt"];

/// Result of scanning a raw config document for key hygiene.
#[derive(Debug, Default)]
pub struct KeyScan {
    /// Dotted paths of keys that are not part of the configuration
    /// surface.  They are ignored; the loader logs each one.
    pub unknown: Vec<String>,
    /// Dotted paths of keys that are accepted under a deprecated name.
    pub deprecated: Vec<String>,
}

/// Scan a parsed (format-agnostic) config document against the enumerated
/// key surface.  Unknown keys never change behavior — the loader warns
/// and drops them.
pub fn scan_keys(doc: &serde_json::Value) -> KeyScan {
    let mut scan = KeyScan::default();
    let Some(root) = doc.as_object() else {
        return scan;
    };

    for (key, value) in root {
        if !KNOWN_TOP_LEVEL.contains(&key.as_str()) {
            scan.unknown.push(key.clone());
            continue;
        }
        if key == "agents" {
            if let Some(list) = value.as_array() {
                for (i, entry) in list.iter().enumerate() {
                    if let Some(map) = entry.as_object() {
                        for k in map.keys() {
                            if !KNOWN_AGENT_KEYS.contains(&k.as_str()) {
                                scan.unknown.push(format!("agents[{i}].{k}"));
                            }
                        }
                    }
                }
            }
            continue;
        }
        let Some((_, known)) = KNOWN_SECTIONS.iter().find(|(name, _)| name == key) else {
            continue;
        };
        if let Some(map) = value.as_object() {
            for k in map.keys() {
                if k == "context_window" {
                    scan.deprecated
                        .push(format!("{key}.{k} (use transcript.context_tokens)"));
                } else if !known.contains(&k.as_str()) {
                    scan.unknown.push(format!("{key}.{k}"));
                }
            }
        }
    }
    scan
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut err = |field: &str, message: String| {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message,
            });
        };

        if self.workspace_root.as_os_str().is_empty() {
            err("workspace_root", "workspace root must be set".into());
        } else if !self.workspace_root.is_absolute() {
            err(
                "workspace_root",
                format!(
                    "workspace root must be absolute (got '{}')",
                    self.workspace_root.display()
                ),
            );
        }

        if self.agents.is_empty() {
            err("agents", "at least one agent must be configured".into());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut supervisors = 0usize;
        for (i, spec) in self.agents.iter().enumerate() {
            if spec.alias.is_empty() {
                err(&format!("agents[{i}].alias"), "alias must not be empty".into());
            } else if !seen.insert(&spec.alias) {
                err(
                    &format!("agents[{i}].alias"),
                    format!("duplicate alias \"{}\"", spec.alias),
                );
            }
            if spec.model_ref.is_empty() {
                err(
                    &format!("agents[{i}].model_ref"),
                    "model_ref must not be empty".into(),
                );
            }
            if spec.role.trim().eq_ignore_ascii_case("supervisor") {
                supervisors += 1;
            }
        }
        if supervisors > 1 {
            err(
                "agents",
                format!("exactly one agent may hold the supervisor role (got {supervisors})"),
            );
        }

        if self.rate_limit.rpm == 0 {
            err("rate_limit.rpm", "rpm must be greater than 0".into());
        }
        if self.rate_limit.tpm == 0 {
            err("rate_limit.tpm", "tpm must be greater than 0".into());
        }

        if self.policy.execution_timeout_seconds == 0 {
            err(
                "policy.execution_timeout_seconds",
                "execution timeout must be greater than 0".into(),
            );
        }
        for (i, p) in self.policy.forbidden_paths.iter().enumerate() {
            if !p.is_absolute() {
                err(
                    &format!("policy.forbidden_paths[{i}]"),
                    format!("forbidden path prefixes must be absolute (got '{}')", p.display()),
                );
            }
        }

        let frac = self.supervisor.break_max_concurrent_fraction;
        if !(0.0..=1.0).contains(&frac) {
            err(
                "supervisor.break_max_concurrent_fraction",
                format!("must be within [0, 1] (got {frac})"),
            );
        }
        if self.supervisor.sleep_minutes == 0 {
            err("supervisor.sleep_minutes", "sleep duration must be non-zero".into());
        }
        if self.supervisor.work_hours_threshold <= 0.0 {
            err(
                "supervisor.work_hours_threshold",
                "work threshold must be positive".into(),
            );
        }

        if self.transcript.window_tokens == 0 {
            err("transcript.window_tokens", "window must be non-zero".into());
        }
        if self.transcript.compression_high_water_tokens < self.transcript.window_tokens {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "transcript.compression_high_water_tokens".into(),
                message: "high-water mark below the prompt window forces compression on every turn"
                    .into(),
            });
        }

        if self.policy.allow_list.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "policy.allow_list".into(),
                message: "empty allow list — every exec will be denied".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
