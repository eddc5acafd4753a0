//! Agent identity and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::xp;

/// Lifecycle state of a worker.  Only the Supervisor transitions agents
/// between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Sleeping,
    OnBreak,
    Degraded,
    Retired,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Sleeping => "sleeping",
            AgentStatus::OnBreak => "on_break",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AgentStatus::Active),
            "sleeping" => Some(AgentStatus::Sleeping),
            "on_break" => Some(AgentStatus::OnBreak),
            "degraded" => Some(AgentStatus::Degraded),
            "retired" => Some(AgentStatus::Retired),
            _ => None,
        }
    }
}

/// A persistent LLM-backed worker identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable UUID, survives across sessions.
    pub agent_id: String,
    /// Short handle like `llama1`; unique among non-retired agents.
    pub alias: String,
    /// Opaque provider+model identifier (e.g. `"ollama/llama3.1:70b"`).
    pub model_ref: String,
    /// Free-text system prompt for this worker.
    pub role: String,
    pub xp: u64,
    /// Always `xp::level_for_xp(self.xp)`.
    pub level: u32,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// When a sleep/break ends, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(alias: impl Into<String>, role: impl Into<String>, model_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: uuid::Uuid::new_v4().to_string(),
            alias: alias.into(),
            model_ref: model_ref.into(),
            role: role.into(),
            xp: 0,
            level: 0,
            status: AgentStatus::Active,
            status_reason: None,
            status_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Exactly one agent per session may hold the supervisor role.
    pub fn is_supervisor(&self) -> bool {
        self.role.trim().eq_ignore_ascii_case("supervisor")
    }

    /// Apply an XP delta (clamped at zero) and recompute the level.
    pub fn apply_xp_delta(&mut self, delta: i64) {
        self.xp = if delta.is_negative() {
            self.xp.saturating_sub(delta.unsigned_abs())
        } else {
            self.xp + delta as u64
        };
        self.level = xp::level_for_xp(self.xp);
        self.updated_at = Utc::now();
    }
}
