use serde::{Deserialize, Serialize};

/// Per-agent provider rate limits, enforced before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute.
    #[serde(default = "d_20")]
    pub rpm: u32,
    /// Tokens per minute.
    #[serde(default = "d_60000")]
    pub tpm: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rpm: d_20(),
            tpm: d_60000(),
        }
    }
}

fn d_20() -> u32 {
    20
}
fn d_60000() -> u64 {
    60_000
}
