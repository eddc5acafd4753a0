use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process isolation level for `exec` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    Off,
    #[default]
    PathCheck,
    /// Namespace isolation (bubblewrap).  Falls back to `path_check` with
    /// a one-time transcript warning when the helper is missing.
    Namespace,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::Off => "off",
            SandboxMode::PathCheck => "path_check",
            SandboxMode::Namespace => "namespace",
        }
    }
}

/// The allow/deny rules and path constraints governing the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Command names agents may execute.
    #[serde(default = "d_allow_list")]
    pub allow_list: BTreeSet<String>,
    /// Command names always rejected, evaluated before `allow_list`.
    #[serde(default)]
    pub deny_list: BTreeSet<String>,
    /// Absolute path prefixes no operation may touch; also screened as
    /// substrings of raw exec commands.
    #[serde(default = "d_forbidden_paths")]
    pub forbidden_paths: Vec<PathBuf>,
    /// Workspace-relative or absolute prefixes writes must fall under.
    /// Empty = the whole workspace is writable.
    #[serde(default)]
    pub writable_paths: Vec<PathBuf>,
    #[serde(default)]
    pub sandbox_mode: SandboxMode,
    /// Default hard timeout for one exec (seconds).
    #[serde(default = "d_120")]
    pub execution_timeout_seconds: u64,
    /// Per-command overrides of the execution timeout.
    #[serde(default)]
    pub per_tool_timeouts: BTreeMap<String, u64>,
    /// Byte budget for each captured stdio channel.
    #[serde(default = "d_65536")]
    pub max_output_bytes: usize,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            allow_list: d_allow_list(),
            deny_list: BTreeSet::new(),
            forbidden_paths: d_forbidden_paths(),
            writable_paths: Vec::new(),
            sandbox_mode: SandboxMode::default(),
            execution_timeout_seconds: d_120(),
            per_tool_timeouts: BTreeMap::new(),
            max_output_bytes: d_65536(),
        }
    }
}

impl ToolPolicy {
    /// Check a single extracted command name against the lists.
    /// Deny always wins; an empty allow list permits nothing.
    pub fn command_allowed(&self, name: &str) -> bool {
        if self.deny_list.contains(name) {
            return false;
        }
        self.allow_list.contains(name)
    }

    /// Effective timeout for the named command.
    pub fn timeout_for(&self, name: &str) -> Duration {
        let secs = self
            .per_tool_timeouts
            .get(name)
            .copied()
            .unwrap_or(self.execution_timeout_seconds);
        Duration::from_secs(secs)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_allow_list() -> BTreeSet<String> {
    [
        "ls", "cat", "head", "tail", "grep", "find", "wc", "diff", "sort", "uniq", "echo",
        "mkdir", "cp", "mv", "touch", "sed", "awk", "git", "python3", "cargo", "make",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn d_forbidden_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/etc"),
        PathBuf::from("/proc"),
        PathBuf::from("/sys"),
        PathBuf::from("/dev"),
        PathBuf::from("/root/.ssh"),
    ]
}

fn d_120() -> u64 {
    120
}
fn d_65536() -> usize {
    65_536
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_wins_over_allow() {
        let mut p = ToolPolicy::default();
        p.allow_list.insert("rm".into());
        p.deny_list.insert("rm".into());
        assert!(!p.command_allowed("rm"));
        assert!(p.command_allowed("ls"));
    }

    #[test]
    fn unknown_command_is_not_allowed() {
        let p = ToolPolicy::default();
        assert!(!p.command_allowed("shutdown"));
    }

    #[test]
    fn per_tool_timeout_overrides_default() {
        let mut p = ToolPolicy::default();
        p.per_tool_timeouts.insert("cargo".into(), 600);
        assert_eq!(p.timeout_for("cargo"), Duration::from_secs(600));
        assert_eq!(p.timeout_for("ls"), Duration::from_secs(120));
    }

    #[test]
    fn sandbox_mode_parses_from_snake_case() {
        let m: SandboxMode = serde_json::from_str("\"path_check\"").unwrap();
        assert_eq!(m, SandboxMode::PathCheck);
        let m: SandboxMode = serde_json::from_str("\"namespace\"").unwrap();
        assert_eq!(m, SandboxMode::Namespace);
    }
}
