use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript window & compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Prompt window size in estimated tokens.
    #[serde(default = "d_16000")]
    pub window_tokens: u64,
    /// Total transcript size that triggers compression of the oldest
    /// range.
    #[serde(default = "d_48000")]
    pub compression_high_water_tokens: u64,
    /// Canonical per-prompt context budget.  `context_window` is accepted
    /// as a deprecated alias on load; internally only this name exists.
    #[serde(default, alias = "context_window")]
    pub context_tokens: Option<u64>,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            window_tokens: d_16000(),
            compression_high_water_tokens: d_48000(),
            context_tokens: None,
        }
    }
}

impl TranscriptConfig {
    /// The window actually used for prompt building.
    pub fn effective_window_tokens(&self) -> u64 {
        self.context_tokens.unwrap_or(self.window_tokens)
    }
}

fn d_16000() -> u64 {
    16_000
}
fn d_48000() -> u64 {
    48_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_window_alias_is_accepted() {
        let cfg: TranscriptConfig =
            serde_json::from_str(r#"{ "context_window": 9000 }"#).unwrap();
        assert_eq!(cfg.context_tokens, Some(9000));
        assert_eq!(cfg.effective_window_tokens(), 9000);
    }

    #[test]
    fn window_tokens_is_the_fallback() {
        let cfg = TranscriptConfig::default();
        assert_eq!(cfg.effective_window_tokens(), 16_000);
    }
}
