use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session budgets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Wall-clock budget for the whole session (seconds).
    #[serde(default = "d_14400")]
    pub time_budget_seconds: u64,
    /// Total token budget across all agents.
    #[serde(default = "d_2000000")]
    pub token_budget_total: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            time_budget_seconds: d_14400(),
            token_budget_total: d_2000000(),
        }
    }
}

fn d_14400() -> u64 {
    14_400
}
fn d_2000000() -> u64 {
    2_000_000
}
