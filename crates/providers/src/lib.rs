//! Collaborator contracts at the edge of the engine.
//!
//! The core treats LLM providers, the transcript summarizer, and the
//! GitHub hand-off gate as opaque collaborators behind these traits.
//! Concrete HTTP adapters live outside this repository; the scripted
//! implementations here exist for tests and local dry runs.

pub mod scripted;

use chrono::{DateTime, Utc};

use axe_domain::error::Result;
use axe_domain::operation::TranscriptEntry;
use axe_domain::stream::{BoxStream, ReplyEvent};

/// One message of a prompt, provider-agnostic.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    /// `"system"`, `"user"`, or an agent alias for shared-transcript
    /// context.
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A stream of [`ReplyEvent`]s; yields text chunks and closes with usage
/// metadata.
pub type ReplyStream = BoxStream<'static, Result<ReplyEvent>>;

/// An LLM backend.  `model_ref` is opaque to the core.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn call(
        &self,
        agent_alias: &str,
        model_ref: &str,
        messages: Vec<PromptMessage>,
        deadline: DateTime<Utc>,
    ) -> Result<ReplyStream>;
}

/// Produces compressed summaries of transcript ranges.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, entries: &[TranscriptEntry], target_tokens: u64) -> Result<String>;
}

/// Operator decision on a proposed GitHub push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GithubDecision {
    Approved,
    Rejected { reason: String },
}

/// The GitHub hand-off gate.  The engine pauses, surfaces the proposed
/// branch and message, and forwards only the operator's decision — no
/// remote write ever happens without it.
#[async_trait::async_trait]
pub trait GithubGate: Send + Sync {
    async fn propose(&self, branch: &str, commit_message: &str) -> Result<GithubDecision>;
}
