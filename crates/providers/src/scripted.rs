//! Scripted collaborators for tests and offline dry runs.
//!
//! [`ScriptedProvider`] replays a queue of canned replies, chunked to
//! exercise the streaming path; [`StaticSummarizer`] returns a fixed
//! summary.  Both record what they were asked.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use axe_domain::error::{Error, Result};
use axe_domain::operation::TranscriptEntry;
use axe_domain::stream::{ReplyEvent, Usage};

use crate::{GithubDecision, GithubGate, PromptMessage, Provider, ReplyStream, Summarizer};

/// One canned reply.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub text: String,
    pub usage: Usage,
}

impl ScriptedReply {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let output_tokens = axe_domain::operation::estimate_tokens(&text);
        Self {
            text,
            usage: Usage {
                input_tokens: 50,
                output_tokens,
                cached_input_tokens: None,
                cached_creation_tokens: None,
            },
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// Outcome queued for one call.
enum Scripted {
    Reply(ScriptedReply),
    Transient(String),
    RateLimited { retry_after_s: u64 },
}

/// Record of one dispatched call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub agent_alias: String,
    pub model_ref: String,
    pub messages: Vec<(String, String)>,
}

/// A provider that replays scripted outcomes in order.  When the queue
/// runs dry every further call yields an empty reply, which parses to
/// zero operations and lets budget-driven termination end the session.
#[derive(Default)]
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<SeenCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: ScriptedReply) -> &Self {
        self.queue.lock().push_back(Scripted::Reply(reply));
        self
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push_reply(ScriptedReply::new(text))
    }

    pub fn push_transient_error(&self, message: impl Into<String>) -> &Self {
        self.queue.lock().push_back(Scripted::Transient(message.into()));
        self
    }

    pub fn push_rate_limited(&self, retry_after_s: u64) -> &Self {
        self.queue
            .lock()
            .push_back(Scripted::RateLimited { retry_after_s });
        self
    }

    /// Calls dispatched so far.
    pub fn calls(&self) -> Vec<SeenCall> {
        self.seen.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    async fn call(
        &self,
        agent_alias: &str,
        model_ref: &str,
        messages: Vec<PromptMessage>,
        _deadline: DateTime<Utc>,
    ) -> Result<ReplyStream> {
        self.seen.lock().push(SeenCall {
            agent_alias: agent_alias.to_owned(),
            model_ref: model_ref.to_owned(),
            messages: messages.iter().map(|m| (m.role.clone(), m.content.clone())).collect(),
        });

        let scripted = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or(Scripted::Reply(ScriptedReply::new("")));

        let reply = match scripted {
            Scripted::Transient(message) => return Err(Error::ProviderTransient(message)),
            Scripted::RateLimited { retry_after_s } => {
                return Err(Error::ProviderRateLimited { retry_after_s })
            }
            Scripted::Reply(reply) => reply,
        };

        let stream = async_stream::stream! {
            // Chunk the text to exercise stream assembly.
            let mut rest = reply.text.as_str();
            while !rest.is_empty() {
                let cut = rest
                    .char_indices()
                    .nth(24)
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                yield Ok(ReplyEvent::Token {
                    text: rest[..cut].to_owned(),
                });
                rest = &rest[cut..];
            }
            yield Ok(ReplyEvent::Done {
                usage: Some(reply.usage.clone()),
            });
        };
        Ok(Box::pin(stream))
    }
}

/// A summarizer that always produces the same text, annotated with the
/// range size so compression tests can assert coverage.
pub struct StaticSummarizer {
    pub prefix: String,
}

impl Default for StaticSummarizer {
    fn default() -> Self {
        Self {
            prefix: "summary of earlier work".into(),
        }
    }
}

#[async_trait::async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize(&self, entries: &[TranscriptEntry], _target_tokens: u64) -> Result<String> {
        Ok(format!("{} ({} entries)", self.prefix, entries.len()))
    }
}

/// A gate that always answers with the configured decision.
pub struct ScriptedGate {
    pub decision: GithubDecision,
    pub proposals: Mutex<Vec<(String, String)>>,
}

impl ScriptedGate {
    pub fn approving() -> Self {
        Self {
            decision: GithubDecision::Approved,
            proposals: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            decision: GithubDecision::Rejected {
                reason: reason.into(),
            },
            proposals: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl GithubGate for ScriptedGate {
    async fn propose(&self, branch: &str, commit_message: &str) -> Result<GithubDecision> {
        self.proposals
            .lock()
            .push((branch.to_owned(), commit_message.to_owned()));
        Ok(self.decision.clone())
    }
}
