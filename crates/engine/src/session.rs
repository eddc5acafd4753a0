//! Session wiring: fresh start and crash-resume.
//!
//! Construction order is explicit and acyclic: Store → Registry →
//! Transcript → Supervisor(Registry, Store) → Scheduler(everything).
//! Components talk only through what they were handed here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use axe_domain::config::Config;
use axe_domain::error::{Error, Result};
use axe_domain::operation::{EntryKind, TranscriptEntry};
use axe_domain::trace::TraceEvent;
use axe_providers::{GithubGate, Provider, Summarizer};
use axe_runner::ToolRunner;
use axe_store::{SessionRecord, Store};

use crate::mailbox::EmergencyMailbox;
use crate::rate_limit::RateLimiter;
use crate::registry::AgentRegistry;
use crate::scheduler::{SchedulerParts, SessionScheduler};
use crate::supervisor::Supervisor;
use crate::transcript::Transcript;

pub struct SessionBuilder {
    config: Config,
    store: Arc<Store>,
    provider: Arc<dyn Provider>,
    summarizer: Arc<dyn Summarizer>,
    github: Option<Arc<dyn GithubGate>>,
}

impl SessionBuilder {
    pub fn new(
        config: Config,
        store: Arc<Store>,
        provider: Arc<dyn Provider>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
            summarizer,
            github: None,
        }
    }

    pub fn with_github(mut self, gate: Arc<dyn GithubGate>) -> Self {
        self.github = Some(gate);
        self
    }

    /// Start a fresh session from the configured roster.
    pub fn start(self) -> Result<SessionScheduler> {
        let session_id = uuid::Uuid::new_v4().to_string();

        let registry = Arc::new(AgentRegistry::new(self.store.clone()));
        let mut aliases = Vec::new();
        for spec in &self.config.agents {
            registry.register(&spec.alias, &spec.role, &spec.model_ref)?;
            aliases.push(spec.alias.clone());
        }

        let session = SessionRecord {
            session_id: session_id.clone(),
            workspace_root: self.config.workspace_root.display().to_string(),
            active_agents: aliases,
            time_budget_seconds: self.config.session.time_budget_seconds,
            token_budget_total: self.config.session.token_budget_total,
            tokens_used: 0,
            github_enabled: self.config.github.enabled,
            policy: self.config.policy.clone(),
            started_at: Utc::now(),
            ended_at: None,
            end_status: None,
            fatal_cause: None,
        };
        self.store.save_session(&session)?;

        let transcript = Arc::new(Transcript::new(
            self.store.clone(),
            session_id.clone(),
            self.config.transcript.clone(),
        ));
        let mut head = TranscriptEntry::new(
            "system",
            EntryKind::SystemNote,
            format!(
                "session started in {} with agents: {}",
                session.workspace_root,
                session.active_agents.join(", ")
            ),
        );
        head.logical_turn = 0;
        transcript.append(head)?;

        TraceEvent::SessionStarted {
            session_id: session_id.clone(),
            workspace_root: session.workspace_root.clone(),
            agents: session.active_agents.len(),
        }
        .emit();

        self.assemble(session, registry, transcript, 0)
    }

    /// Rebuild a session from persisted state alone: session row, full
    /// transcript, agent rows, and pending supervisor timers.
    pub fn resume(self, session_id: &str) -> Result<SessionScheduler> {
        let session = self
            .store
            .resume_session(session_id)?
            .ok_or_else(|| Error::Config(format!("unknown session '{session_id}'")))?;
        if session.ended_at.is_some() {
            return Err(Error::Config(format!(
                "session '{session_id}' already ended ({})",
                session.end_status.as_deref().unwrap_or("unknown")
            )));
        }

        let registry = Arc::new(AgentRegistry::new(self.store.clone()));
        for alias in &session.active_agents {
            let agent = self
                .store
                .get_agent(alias)?
                .ok_or_else(|| Error::Store(format!("agent '{alias}' missing from store")))?;
            registry.attach(agent);
        }

        let transcript = Arc::new(Transcript::resume(
            self.store.clone(),
            session_id,
            self.config.transcript.clone(),
        )?);
        let last_logical = transcript
            .entries()
            .iter()
            .map(|e| e.logical_turn)
            .max()
            .unwrap_or(0);

        TraceEvent::SessionResumed {
            session_id: session_id.to_owned(),
            transcript_len: transcript.len() as u64,
        }
        .emit();

        self.assemble(session, registry, transcript, last_logical)
    }

    fn assemble(
        self,
        session: SessionRecord,
        registry: Arc<AgentRegistry>,
        transcript: Arc<Transcript>,
        initial_logical_turn: u64,
    ) -> Result<SessionScheduler> {
        let mailbox_dir = match &self.config.supervisor.mailbox_path {
            Some(dir) => dir.clone(),
            None => axe_store::default_db_path()?
                .parent()
                .map(|p| p.join("mailbox"))
                .unwrap_or_else(|| std::path::PathBuf::from("mailbox")),
        };
        let mailbox = EmergencyMailbox::new(
            mailbox_dir,
            self.config.supervisor.operator_public_key_path.as_deref(),
        );

        let supervisor = Arc::new(Supervisor::new(
            self.config.supervisor.clone(),
            registry.clone(),
            self.store.clone(),
            mailbox,
        ));
        supervisor.restore_timers(Utc::now())?;

        // The runner enforces the *persisted* policy, so a resumed
        // session keeps the rules it started with.
        let runner = Arc::new(ToolRunner::new(
            session.workspace_root.clone(),
            session.policy.clone(),
        )?);

        let specs: HashMap<_, _> = self
            .config
            .agents
            .iter()
            .map(|s| (s.alias.clone(), s.clone()))
            .collect();

        Ok(SessionScheduler::new(SchedulerParts {
            window_tokens: self.config.transcript.effective_window_tokens(),
            rate_limiter: RateLimiter::new(self.config.rate_limit.clone()),
            session,
            specs,
            registry,
            transcript,
            supervisor,
            runner,
            provider: self.provider,
            summarizer: self.summarizer,
            github: self.github,
            store: self.store,
            initial_logical_turn,
        }))
    }
}
