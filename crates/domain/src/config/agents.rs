use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static agent roster
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One worker in the session roster, as declared in configuration.
/// The scheduler turns these into registered agents at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Short unique handle, e.g. `llama1`.
    pub alias: String,
    /// Free-text role; the literal `supervisor` marks the safety agent.
    pub role: String,
    /// Opaque provider+model reference, e.g. `"ollama/qwen2.5-coder"`.
    pub model_ref: String,
    /// System prompt prepended to every turn for this agent.
    #[serde(default)]
    pub default_system_prompt: String,
}
