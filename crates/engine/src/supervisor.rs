//! The safety plane.  The Supervisor is the only component that changes
//! an agent's lifecycle status: mandatory sleep on work/token
//! thresholds, degradation-triggered sleep, break quotas, and the
//! one-way emergency mailbox.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use axe_domain::agent::AgentStatus;
use axe_domain::config::SupervisorConfig;
use axe_domain::error::Result;
use axe_domain::operation::{Operation, OperationResult, OperationStatus};
use axe_store::{Store, TimerRecord};

use crate::mailbox::EmergencyMailbox;
use crate::registry::AgentRegistry;

/// How many recent operations feed the degradation score.
const RECENT_WINDOW: usize = 50;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One executed operation, reduced to the signals the degradation score
/// cares about.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpObservation {
    pub syntax_error: bool,
    pub test_failure: bool,
    pub semantic_smell: bool,
    pub diff_anomaly: bool,
}

impl OpObservation {
    /// Classify an executed operation.  Heuristics, not judgments: a
    /// stderr mentioning a syntax problem, a failing test command, a
    /// policy denial (the agent pushing against the fence), or an
    /// implausibly large write.
    pub fn from_result(op: &Operation, result: &OperationResult) -> Self {
        let stderr_lower = result
            .stderr
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let failed_exit = result.exit_code.is_some_and(|c| c != 0);

        let syntax_error = failed_exit
            && (stderr_lower.contains("syntax") || stderr_lower.contains("parse error"));

        let test_failure = failed_exit
            && matches!(op, Operation::Exec { command } if command.contains("test"));

        let semantic_smell = result.status == OperationStatus::Denied;

        let diff_anomaly = matches!(
            op,
            Operation::Write { content, .. } | Operation::Append { content, .. }
                if content.len() > 16_000
        );

        Self {
            syntax_error,
            test_failure,
            semantic_smell,
            diff_anomaly,
        }
    }
}

/// Composite score: `0.4·syntax + 0.3·test_fail + 0.2·smell +
/// 0.1·diff_anomaly`, each term the rate over the recent window.
pub fn degradation_score(observations: &[OpObservation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let n = observations.len() as f64;
    let rate = |f: fn(&OpObservation) -> bool| {
        observations.iter().filter(|o| f(o)).count() as f64 / n
    };
    0.4 * rate(|o| o.syntax_error)
        + 0.3 * rate(|o| o.test_failure)
        + 0.2 * rate(|o| o.semantic_smell)
        + 0.1 * rate(|o| o.diff_anomaly)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct AgentWork {
    active_seconds: f64,
    tokens: u64,
    turns_since_check: u64,
    recent: VecDeque<OpObservation>,
    breaks_granted: Vec<DateTime<Utc>>,
}

pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<AgentRegistry>,
    store: Arc<Store>,
    mailbox: EmergencyMailbox,
    work: Mutex<HashMap<String, AgentWork>>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        registry: Arc<AgentRegistry>,
        store: Arc<Store>,
        mailbox: EmergencyMailbox,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            mailbox,
            work: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one completed turn into the counters and enforce thresholds.
    pub fn observe_turn(
        &self,
        agent_id: &str,
        active_seconds: f64,
        tokens: u64,
        observations: &[OpObservation],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (work_exceeded, degradation) = {
            let mut work = self.work.lock();
            let w = work.entry(agent_id.to_owned()).or_default();
            w.active_seconds += active_seconds;
            w.tokens += tokens;
            w.turns_since_check += 1;
            for obs in observations {
                if w.recent.len() == RECENT_WINDOW {
                    w.recent.pop_front();
                }
                w.recent.push_back(*obs);
            }

            let work_exceeded = w.active_seconds > self.config.work_hours_threshold * 3600.0
                || w.tokens > self.config.token_threshold;

            let degradation = if w.turns_since_check >= self.config.degradation_check_interval_turns
            {
                w.turns_since_check = 0;
                let samples: Vec<OpObservation> = w.recent.iter().copied().collect();
                Some(degradation_score(&samples))
            } else {
                None
            };
            (work_exceeded, degradation)
        };

        if work_exceeded {
            self.force_sleep(agent_id, "mandatory sleep: work threshold reached", now)?;
            return Ok(());
        }
        if let Some(score) = degradation {
            if score > self.config.degradation_score_threshold {
                self.force_sleep(
                    agent_id,
                    &format!("degradation score {score:.2} above threshold"),
                    now,
                )?;
            }
        }
        Ok(())
    }

    /// Put an agent to sleep until `now + sleep_minutes`.
    pub fn force_sleep(&self, agent_id: &str, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.sleep_for(agent_id, reason, self.config.sleep_minutes, now)
    }

    /// Grant an agent-requested sleep (`[[SLEEP: …]]`).
    pub fn request_sleep(
        &self,
        agent_id: &str,
        minutes: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let minutes = minutes.max(1);
        self.sleep_for(agent_id, &format!("requested: {reason}"), minutes, now)
    }

    fn sleep_for(
        &self,
        agent_id: &str,
        reason: &str,
        minutes: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expires = now + Duration::minutes(minutes as i64);
        self.registry
            .set_status(agent_id, AgentStatus::Sleeping, reason, Some(expires))?;
        self.store.save_timer(&TimerRecord {
            agent_id: agent_id.to_owned(),
            kind: "sleep".into(),
            expires_at: expires,
        })?;
        Ok(())
    }

    /// Grant or deny a break request (`[[BREAK: …]]`).
    pub fn request_break(
        &self,
        agent_id: &str,
        minutes: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if minutes > self.config.break_max_minutes {
            return Ok(false);
        }

        let pool = self.registry.list_all();
        let pool_size = pool.len().max(1);
        let on_break = pool
            .iter()
            .filter(|a| a.status == AgentStatus::OnBreak)
            .count();
        if (on_break as f64 + 1.0) / pool_size as f64 > self.config.break_max_concurrent_fraction {
            return Ok(false);
        }

        {
            let mut work = self.work.lock();
            let w = work.entry(agent_id.to_owned()).or_default();
            let hour_ago = now - Duration::hours(1);
            w.breaks_granted.retain(|t| *t > hour_ago);
            if w.breaks_granted.len() >= self.config.break_per_hour as usize {
                return Ok(false);
            }
            w.breaks_granted.push(now);
        }

        let expires = now + Duration::minutes(minutes as i64);
        self.registry.set_status(
            agent_id,
            AgentStatus::OnBreak,
            &format!("break: {reason}"),
            Some(expires),
        )?;
        self.store.save_timer(&TimerRecord {
            agent_id: agent_id.to_owned(),
            kind: "break".into(),
            expires_at: expires,
        })?;
        Ok(true)
    }

    /// Wake agents whose sleep/break has expired; their work counters
    /// reset.  Returns the aliases woken.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut woken = Vec::new();
        for agent in self.registry.list_all() {
            let resting = matches!(agent.status, AgentStatus::Sleeping | AgentStatus::OnBreak);
            if !resting {
                continue;
            }
            let Some(expires) = agent.status_expires_at else {
                continue;
            };
            if expires > now {
                continue;
            }
            self.registry
                .set_status(&agent.agent_id, AgentStatus::Active, "rest period over", None)?;
            self.work.lock().remove(&agent.agent_id);
            self.store.clear_timer(&agent.agent_id, "sleep")?;
            self.store.clear_timer(&agent.agent_id, "break")?;
            woken.push(agent.alias);
        }
        Ok(woken)
    }

    /// Emergency sleep override: permitted only while task progress is
    /// under 10%, and always logged.
    pub fn override_sleep(&self, agent_id: &str, progress_fraction: f64) -> Result<bool> {
        if progress_fraction >= 0.10 {
            return Ok(false);
        }
        tracing::warn!(
            agent_id,
            progress = progress_fraction,
            "emergency sleep override granted"
        );
        self.registry.set_status(
            agent_id,
            AgentStatus::Active,
            "emergency override (progress < 10%)",
            None,
        )?;
        self.work.lock().remove(agent_id);
        self.store.clear_timer(agent_id, "sleep")?;
        Ok(true)
    }

    /// Mark an agent degraded (scheduler calls this after a provider
    /// gives up on a turn).
    pub fn mark_degraded(&self, agent_id: &str, reason: &str) -> Result<()> {
        self.registry
            .set_status(agent_id, AgentStatus::Degraded, reason, None)?;
        Ok(())
    }

    /// Forward an emergency payload to the mailbox.  One-way: nothing is
    /// returned and nothing is readable back from here.
    pub fn emergency(&self, payload: &str) {
        self.mailbox.deposit(payload);
    }

    /// Restore pending sleep/break expiries from the store (resume
    /// path).  Agent statuses themselves were already reloaded with the
    /// agent rows; this only re-arms wake-ups that are still in the
    /// future and releases ones that lapsed while the process was down.
    pub fn restore_timers(&self, now: DateTime<Utc>) -> Result<()> {
        for timer in self.store.pending_timers()? {
            if timer.expires_at <= now {
                if self
                    .registry
                    .resolve(&timer.agent_id)
                    .is_some_and(|a| {
                        matches!(a.status, AgentStatus::Sleeping | AgentStatus::OnBreak)
                    })
                {
                    self.registry.set_status(
                        &timer.agent_id,
                        AgentStatus::Active,
                        "rest period lapsed during downtime",
                        None,
                    )?;
                }
                self.store.clear_timer(&timer.agent_id, &timer.kind)?;
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
