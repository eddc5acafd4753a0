use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor safety plane
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Continuous active work before mandatory sleep (hours).
    #[serde(default = "d_6_0")]
    pub work_hours_threshold: f64,
    /// Tokens processed before mandatory sleep.
    #[serde(default = "d_500000")]
    pub token_threshold: u64,
    /// Duration of a mandatory sleep (minutes).
    #[serde(default = "d_30")]
    pub sleep_minutes: u64,
    /// Composite degradation score above which an agent is put to sleep.
    #[serde(default = "d_0_20")]
    pub degradation_score_threshold: f64,
    /// Degradation is evaluated every this many turns per agent.
    #[serde(default = "d_10")]
    pub degradation_check_interval_turns: u64,
    /// Break requests are denied while this fraction of the pool is
    /// already on break.
    #[serde(default = "d_0_4")]
    pub break_max_concurrent_fraction: f64,
    /// Maximum granted breaks per agent per rolling hour.
    #[serde(default = "d_2")]
    pub break_per_hour: u32,
    /// Longest grantable break (minutes).
    #[serde(default = "d_15")]
    pub break_max_minutes: u64,
    /// Emergency mailbox directory.  Must live outside the workspace;
    /// defaults to `<db dir>/mailbox`.
    #[serde(default)]
    pub mailbox_path: Option<PathBuf>,
    /// PEM-encoded RSA public key of the operator; payloads dropped into
    /// the mailbox are encrypted to it.
    #[serde(default)]
    pub operator_public_key_path: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            work_hours_threshold: d_6_0(),
            token_threshold: d_500000(),
            sleep_minutes: d_30(),
            degradation_score_threshold: d_0_20(),
            degradation_check_interval_turns: d_10(),
            break_max_concurrent_fraction: d_0_4(),
            break_per_hour: d_2(),
            break_max_minutes: d_15(),
            mailbox_path: None,
            operator_public_key_path: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_6_0() -> f64 {
    6.0
}
fn d_500000() -> u64 {
    500_000
}
fn d_30() -> u64 {
    30
}
fn d_0_20() -> f64 {
    0.20
}
fn d_10() -> u64 {
    10
}
fn d_0_4() -> f64 {
    0.4
}
fn d_2() -> u32 {
    2
}
fn d_15() -> u64 {
    15
}
