use serde::Serialize;

/// Structured trace events emitted across all AXE crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        session_id: String,
        workspace_root: String,
        agents: usize,
    },
    SessionResumed {
        session_id: String,
        transcript_len: u64,
    },
    TurnStarted {
        session_id: String,
        logical_turn: u64,
        alias: String,
    },
    TurnCompleted {
        session_id: String,
        logical_turn: u64,
        alias: String,
        operations: usize,
        input_tokens: u64,
        output_tokens: u64,
    },
    OperationExecuted {
        alias: String,
        kind: String,
        status: String,
        duration_ms: u64,
    },
    AgentStatusChanged {
        alias: String,
        from: String,
        to: String,
        reason: String,
    },
    XpAwarded {
        alias: String,
        delta: i64,
        total: u64,
        level: u32,
        reason: String,
    },
    RateLimitDeferred {
        alias: String,
        wait_ms: u64,
    },
    TranscriptCompacted {
        session_id: String,
        start_turn: u64,
        end_turn: u64,
        tokens_before: u64,
        tokens_after: u64,
    },
    SandboxFallback {
        requested: String,
        actual: String,
    },
    MailboxWrite {
        bytes: usize,
    },
    GithubPaused {
        branch: String,
    },
    SessionEnded {
        session_id: String,
        status: String,
        total_tokens: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "axe_event");
    }
}
