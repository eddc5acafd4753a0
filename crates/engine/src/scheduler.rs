//! The collaborative session scheduler.
//!
//! One serialized loop drives the session turn by turn: pick the next
//! eligible agent (round-robin with level-weighted preemption), build a
//! bounded prompt from the shared transcript, dispatch to the provider,
//! stream the reply back, execute parsed operations, route control
//! tokens, persist, and let the Supervisor observe.  Every entry carries
//! a `logical_turn` stamp derived from selection order so a parallel
//! dispatcher could be introduced later without changing the schema.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;

use axe_domain::agent::{Agent, AgentStatus};
use axe_domain::config::AgentSpec;
use axe_domain::error::{Error, Result};
use axe_domain::operation::{estimate_tokens, EntryKind, TranscriptEntry};
use axe_domain::stream::{ReplyEvent, Usage};
use axe_domain::trace::TraceEvent;
use axe_parser::parse_reply;
use axe_providers::{GithubDecision, GithubGate, PromptMessage, Provider, Summarizer};
use axe_runner::ToolRunner;
use axe_store::{SessionRecord, Store};

use crate::cancel::CancelToken;
use crate::control::{self, ControlSignal};
use crate::rate_limit::RateLimiter;
use crate::registry::AgentRegistry;
use crate::supervisor::{OpObservation, Supervisor};
use crate::transcript::Transcript;

/// Level lead required for an agent to preempt strict round-robin.
const PREEMPTION_LEVEL_LEAD: u32 = 3;
/// Provider retry attempts for transient faults.
const PROVIDER_RETRIES: u32 = 3;
/// Base backoff between transient retries (doubles each attempt).
const BACKOFF_BASE_MS: u64 = 100;
/// XP granted to each participant when the pool completes the task.
const COMPLETION_XP: i64 = 50;

/// Final report of one session run.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub end_status: String,
    pub fatal_cause: Option<String>,
    pub total_tokens: u64,
    pub turns: u64,
    pub xp_deltas: Vec<(String, i64)>,
}

/// Everything the scheduler drives, wired in construction order (see
/// [`crate::session::SessionBuilder`]).
pub struct SchedulerParts {
    pub session: SessionRecord,
    pub specs: HashMap<String, AgentSpec>,
    pub registry: Arc<AgentRegistry>,
    pub transcript: Arc<Transcript>,
    pub supervisor: Arc<Supervisor>,
    pub runner: Arc<ToolRunner>,
    pub provider: Arc<dyn Provider>,
    pub summarizer: Arc<dyn Summarizer>,
    pub github: Option<Arc<dyn GithubGate>>,
    pub store: Arc<Store>,
    pub rate_limiter: RateLimiter,
    pub window_tokens: u64,
    pub initial_logical_turn: u64,
}

pub struct SessionScheduler {
    session: SessionRecord,
    specs: HashMap<String, AgentSpec>,
    registry: Arc<AgentRegistry>,
    transcript: Arc<Transcript>,
    supervisor: Arc<Supervisor>,
    runner: Arc<ToolRunner>,
    provider: Arc<dyn Provider>,
    summarizer: Arc<dyn Summarizer>,
    github: Option<Arc<dyn GithubGate>>,
    store: Arc<Store>,
    rate_limiter: RateLimiter,
    window_tokens: u64,

    cancel: CancelToken,
    started: Instant,
    rr_cursor: usize,
    logical_turn: u64,
    completion_votes: HashMap<String, u64>,
    xp_baseline: HashMap<String, u64>,
    notes: Mutex<HashMap<String, Vec<String>>>,
}

enum TurnOutcome {
    Completed,
    Abandoned,
    Deferred(Duration),
}

impl SessionScheduler {
    pub fn new(parts: SchedulerParts) -> Self {
        let xp_baseline = parts
            .registry
            .list_all()
            .into_iter()
            .map(|a| (a.alias, a.xp))
            .collect();
        Self {
            session: parts.session,
            specs: parts.specs,
            registry: parts.registry,
            transcript: parts.transcript,
            supervisor: parts.supervisor,
            runner: parts.runner,
            provider: parts.provider,
            summarizer: parts.summarizer,
            github: parts.github,
            store: parts.store,
            rate_limiter: parts.rate_limiter,
            window_tokens: parts.window_tokens,
            cancel: CancelToken::new(),
            started: Instant::now(),
            rr_cursor: 0,
            logical_turn: parts.initial_logical_turn,
            completion_votes: HashMap::new(),
            xp_baseline,
            notes: Mutex::new(HashMap::new()),
        }
    }

    /// Cancellation handle for this session; observed at every
    /// suspension point.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Drive the session to termination.
    pub async fn run(&mut self) -> Result<SessionSummary> {
        loop {
            if self.cancel.is_cancelled() {
                return self.finish("cancelled", None);
            }

            let now = Utc::now();
            for woken in self.supervisor.tick(now)? {
                self.append_system(&format!("agent {woken} is active again"))?;
            }

            if self.started.elapsed().as_secs() >= self.session.time_budget_seconds {
                return self.finish("time_budget_exhausted", None);
            }
            if self.session.tokens_used >= self.session.token_budget_total {
                return self.finish("token_budget_exhausted", None);
            }

            let active = self.registry.list_active();
            if active.is_empty() {
                if self.no_recovery_possible() {
                    return self.finish("no_recoverable_agents", None);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            let agent = self.pick_next(&active);
            match self.drive_turn(&agent).await {
                Ok(TurnOutcome::Completed) => {
                    if self.unanimous_completion() {
                        self.award_completion_xp()?;
                        return self.finish("completed", None);
                    }
                }
                Ok(TurnOutcome::Abandoned) => {}
                Ok(TurnOutcome::Deferred(wait)) => {
                    TraceEvent::RateLimitDeferred {
                        alias: agent.alias.clone(),
                        wait_ms: wait.as_millis() as u64,
                    }
                    .emit();
                    tokio::time::sleep(wait.min(Duration::from_millis(500))).await;
                }
                Err(e) if e.is_fatal() => {
                    // No further writes; report the cause and stop.
                    return Ok(SessionSummary {
                        session_id: self.session.session_id.clone(),
                        end_status: "fatal".into(),
                        fatal_cause: Some(e.to_string()),
                        total_tokens: self.session.tokens_used,
                        turns: self.logical_turn,
                        xp_deltas: self.xp_deltas(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Agent selection ──────────────────────────────────────────────

    /// Round-robin with level-weighted preemption: an agent whose level
    /// exceeds every other candidate's by at least
    /// [`PREEMPTION_LEVEL_LEAD`] claims the turn.
    fn pick_next(&mut self, candidates: &[Agent]) -> Agent {
        debug_assert!(!candidates.is_empty());

        if candidates.len() > 1 {
            if let Some(leader) = candidates.iter().max_by_key(|a| a.level) {
                let dominates = candidates
                    .iter()
                    .filter(|a| a.agent_id != leader.agent_id)
                    .all(|a| leader.level >= a.level + PREEMPTION_LEVEL_LEAD);
                if dominates {
                    return leader.clone();
                }
            }
        }

        let picked = candidates[self.rr_cursor % candidates.len()].clone();
        self.rr_cursor = (self.rr_cursor + 1) % candidates.len();
        picked
    }

    // ── One turn ─────────────────────────────────────────────────────

    async fn drive_turn(&mut self, agent: &Agent) -> Result<TurnOutcome> {
        let prompt = self.build_prompt(agent);
        let estimated: u64 = prompt.iter().map(|m| estimate_tokens(&m.content)).sum();

        if let Err(wait) = self.rate_limiter.admit(&agent.alias, estimated) {
            return Ok(TurnOutcome::Deferred(wait));
        }

        self.logical_turn += 1;
        TraceEvent::TurnStarted {
            session_id: self.session.session_id.clone(),
            logical_turn: self.logical_turn,
            alias: agent.alias.clone(),
        }
        .emit();
        let turn_started = Instant::now();

        let (reply, usage) = match self.dispatch_with_retry(agent, prompt).await {
            Ok(reply) => reply,
            Err(Error::ProviderRateLimited { retry_after_s }) => {
                // Consumes no turn.
                self.logical_turn -= 1;
                return Ok(TurnOutcome::Deferred(Duration::from_secs(retry_after_s)));
            }
            Err(Error::Cancelled) => return Ok(TurnOutcome::Abandoned),
            Err(Error::ProviderTransient(message)) => {
                self.supervisor
                    .mark_degraded(&agent.agent_id, "provider gave up after retries")?;
                self.append_system(&format!(
                    "turn abandoned: provider failure for {} ({message}); agent marked degraded",
                    agent.alias
                ))?;
                return Ok(TurnOutcome::Abandoned);
            }
            Err(e) => return Err(e),
        };

        // Reply into the shared transcript.
        let mut entry = TranscriptEntry::new(&agent.alias, EntryKind::Message, &reply);
        entry.logical_turn = self.logical_turn;
        self.transcript.append(entry)?;

        let usage = usage.unwrap_or_default();
        self.session.tokens_used += usage.total();
        self.rate_limiter
            .record_actual(&agent.alias, estimated, usage.total());

        // Execute operations in textual order; results are appended
        // contiguously.  Deduplication already happened in the parser —
        // the set executed equals the set emitted.
        let ops = parse_reply(&reply);
        if let Some(warning) = self.runner.take_sandbox_warning() {
            self.append_system(&warning)?;
        }
        let mut observations = Vec::with_capacity(ops.len());
        for op in &ops {
            let op_started = Instant::now();
            let result = self.runner.run(op).await;
            TraceEvent::OperationExecuted {
                alias: agent.alias.clone(),
                kind: op.kind_str().into(),
                status: format!("{:?}", result.status).to_lowercase(),
                duration_ms: op_started.elapsed().as_millis() as u64,
            }
            .emit();
            observations.push(OpObservation::from_result(op, &result));

            let mut entry =
                TranscriptEntry::new("tool", EntryKind::OperationResult, result.render(op));
            entry.logical_turn = self.logical_turn;
            self.transcript.append(entry)?;
        }

        self.route_control_signals(agent, &reply).await?;

        // Supervisor observes the turn and may transition the agent.
        self.supervisor.observe_turn(
            &agent.agent_id,
            turn_started.elapsed().as_secs_f64(),
            usage.total(),
            &observations,
            Utc::now(),
        )?;

        self.transcript.maybe_compress(self.summarizer.as_ref()).await?;
        self.store.save_session(&self.session)?;

        TraceEvent::TurnCompleted {
            session_id: self.session.session_id.clone(),
            logical_turn: self.logical_turn,
            alias: agent.alias.clone(),
            operations: ops.len(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
        .emit();
        Ok(TurnOutcome::Completed)
    }

    // ── Prompt construction ──────────────────────────────────────────

    fn build_prompt(&self, agent: &Agent) -> Vec<PromptMessage> {
        let mut messages = Vec::new();

        let mut system = agent.role.clone();
        if let Some(spec) = self.specs.get(&agent.alias) {
            if !spec.default_system_prompt.is_empty() {
                system.push_str("\n\n");
                system.push_str(&spec.default_system_prompt);
            }
        }
        messages.push(PromptMessage::system(system));

        for entry in self.transcript.window(self.window_tokens) {
            messages.push(PromptMessage {
                role: entry.author.clone(),
                content: entry.body.clone(),
            });
        }

        if let Some(notes) = self.notes.lock().remove(&agent.alias) {
            for note in notes {
                messages.push(PromptMessage::system(format!("[supervisor] {note}")));
            }
        }
        messages
    }

    // ── Provider dispatch ────────────────────────────────────────────

    async fn dispatch_with_retry(
        &self,
        agent: &Agent,
        messages: Vec<PromptMessage>,
    ) -> Result<(String, Option<Usage>)> {
        let remaining = self
            .session
            .time_budget_seconds
            .saturating_sub(self.started.elapsed().as_secs());
        let deadline = Utc::now() + chrono::Duration::seconds(remaining.max(1) as i64);

        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let call = self
                .provider
                .call(&agent.alias, &agent.model_ref, messages.clone(), deadline)
                .await;

            match call {
                Ok(stream) => match self.collect_stream(stream).await {
                    Ok(reply) => return Ok(reply),
                    Err(Error::ProviderTransient(m)) if attempt + 1 < PROVIDER_RETRIES => {
                        tracing::warn!(alias = %agent.alias, attempt, error = %m, "provider stream failed; retrying");
                        attempt += 1;
                        tokio::time::sleep(Duration::from_millis(
                            BACKOFF_BASE_MS << (attempt - 1),
                        ))
                        .await;
                    }
                    Err(e) => return Err(e),
                },
                Err(Error::ProviderTransient(m)) if attempt + 1 < PROVIDER_RETRIES => {
                    tracing::warn!(alias = %agent.alias, attempt, error = %m, "provider transient; retrying");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1)))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn collect_stream(
        &self,
        mut stream: axe_providers::ReplyStream,
    ) -> Result<(String, Option<Usage>)> {
        let mut text = String::new();
        let mut usage = None;
        while let Some(event) = stream.next().await {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match event? {
                ReplyEvent::Token { text: chunk } => text.push_str(&chunk),
                ReplyEvent::Done { usage: u } => usage = u,
                ReplyEvent::Error { message } => return Err(Error::ProviderTransient(message)),
            }
        }
        Ok((text, usage))
    }

    // ── Control tokens ───────────────────────────────────────────────

    async fn route_control_signals(&mut self, agent: &Agent, reply: &str) -> Result<()> {
        for signal in control::scan(reply) {
            match signal {
                ControlSignal::SleepRequest { minutes, reason } => {
                    self.supervisor
                        .request_sleep(&agent.agent_id, minutes, &reason, Utc::now())?;
                    self.append_system(&format!(
                        "agent {} sleeping for {minutes}m ({reason})",
                        agent.alias
                    ))?;
                }
                ControlSignal::BreakRequest { minutes, reason } => {
                    let granted = self.supervisor.request_break(
                        &agent.agent_id,
                        minutes,
                        &reason,
                        Utc::now(),
                    )?;
                    if granted {
                        self.append_system(&format!(
                            "agent {} on break for {minutes}m",
                            agent.alias
                        ))?;
                    } else {
                        self.push_note(
                            &agent.alias,
                            format!("break request ({minutes}m) denied by quota"),
                        );
                    }
                }
                ControlSignal::Emergency { payload } => {
                    // One-way drop; deliberately leaves no transcript
                    // trace for the Supervisor to read.
                    self.supervisor.emergency(&payload);
                }
                ControlSignal::GithubReady { branch, message } => {
                    self.handle_github(agent, &branch, &message).await?;
                }
                ControlSignal::TaskComplete => {
                    self.completion_votes
                        .insert(agent.alias.clone(), self.logical_turn);
                }
            }
        }
        Ok(())
    }

    async fn handle_github(&mut self, agent: &Agent, branch: &str, message: &str) -> Result<()> {
        if !self.session.github_enabled {
            self.push_note(&agent.alias, "github hand-off is disabled for this session".into());
            return Ok(());
        }
        let Some(gate) = self.github.clone() else {
            self.push_note(&agent.alias, "no github gate is attached".into());
            return Ok(());
        };

        // The scheduler pauses here: no other turn runs while the
        // operator decides.
        TraceEvent::GithubPaused {
            branch: branch.to_owned(),
        }
        .emit();
        match gate.propose(branch, message).await? {
            GithubDecision::Approved => {
                self.append_system(&format!(
                    "operator approved push of branch {branch} ({message})"
                ))?;
            }
            GithubDecision::Rejected { reason } => {
                self.append_system(&format!("operator rejected push of branch {branch}: {reason}"))?;
            }
        }
        Ok(())
    }

    // ── Completion & termination ─────────────────────────────────────

    /// Unanimous completion: every currently-active agent voted
    /// `[[TASK_COMPLETE]]` within the last two logical turns.
    fn unanimous_completion(&self) -> bool {
        let active = self.registry.list_active();
        if active.is_empty() {
            return false;
        }
        active.iter().all(|a| {
            self.completion_votes
                .get(&a.alias)
                .is_some_and(|vote| vote + 1 >= self.logical_turn)
        })
    }

    fn award_completion_xp(&self) -> Result<()> {
        for agent in self.registry.list_active() {
            self.registry
                .award_xp(&agent.agent_id, COMPLETION_XP, "task completed")?;
        }
        Ok(())
    }

    /// True when no sleeping/on-break agent can return before the time
    /// budget runs out (or none can return at all).
    fn no_recovery_possible(&self) -> bool {
        let budget_end = Utc::now()
            + chrono::Duration::seconds(
                self.session
                    .time_budget_seconds
                    .saturating_sub(self.started.elapsed().as_secs()) as i64,
            );
        !self.registry.list_all().iter().any(|a| {
            matches!(a.status, AgentStatus::Sleeping | AgentStatus::OnBreak)
                && a.status_expires_at.is_some_and(|t| t < budget_end)
        })
    }

    fn finish(&mut self, status: &str, fatal_cause: Option<String>) -> Result<SessionSummary> {
        let xp_deltas = self.xp_deltas();
        let mut summary_body = format!(
            "session {status}: {} tokens used of {}, {} logical turns",
            self.session.tokens_used, self.session.token_budget_total, self.logical_turn
        );
        for (alias, delta) in &xp_deltas {
            summary_body.push_str(&format!("\n{alias}: {delta:+} xp"));
        }
        if let Some(cause) = &fatal_cause {
            summary_body.push_str(&format!(
                "\nfatal: {cause}\nresume token: {}",
                self.session.session_id
            ));
        }
        self.append_system(&summary_body)?;

        self.session.ended_at = Some(Utc::now());
        self.session.end_status = Some(status.to_owned());
        self.session.fatal_cause = fatal_cause.clone();
        self.store.save_session(&self.session)?;

        TraceEvent::SessionEnded {
            session_id: self.session.session_id.clone(),
            status: status.to_owned(),
            total_tokens: self.session.tokens_used,
        }
        .emit();

        Ok(SessionSummary {
            session_id: self.session.session_id.clone(),
            end_status: status.to_owned(),
            fatal_cause,
            total_tokens: self.session.tokens_used,
            turns: self.logical_turn,
            xp_deltas,
        })
    }

    fn xp_deltas(&self) -> Vec<(String, i64)> {
        self.registry
            .list_all()
            .into_iter()
            .map(|a| {
                let before = self.xp_baseline.get(&a.alias).copied().unwrap_or(0);
                (a.alias, a.xp as i64 - before as i64)
            })
            .collect()
    }

    // ── Small helpers ────────────────────────────────────────────────

    fn append_system(&self, body: &str) -> Result<()> {
        let mut entry = TranscriptEntry::new("system", EntryKind::SystemNote, body);
        entry.logical_turn = self.logical_turn;
        self.transcript.append(entry)?;
        Ok(())
    }

    fn push_note(&self, alias: &str, note: String) {
        self.notes.lock().entry(alias.to_owned()).or_default().push(note);
    }
}
