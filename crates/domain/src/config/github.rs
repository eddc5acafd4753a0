use serde::{Deserialize, Serialize};

/// GitHub hand-off gate.  Disabled by default; even when enabled, no
/// remote write happens without an explicit operator approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_branch_prefix")]
    pub branch_prefix: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            branch_prefix: d_branch_prefix(),
        }
    }
}

fn d_branch_prefix() -> String {
    "axe/".into()
}
