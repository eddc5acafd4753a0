//! Runtime source of truth for agent identity and state.
//!
//! The registry mirrors agent rows in memory and writes every mutation
//! back to the store.  Identity is persistent: registering an alias that
//! already exists in the store adopts that agent (with its XP history)
//! instead of minting a new one.
//!
//! Status transitions go through [`AgentRegistry::set_status`], which
//! only the Supervisor calls — every other component treats status as
//! read-only.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use axe_domain::agent::{Agent, AgentStatus};
use axe_domain::error::{Error, Result};
use axe_domain::trace::TraceEvent;
use axe_store::Store;

pub struct AgentRegistry {
    store: Arc<Store>,
    /// Keyed by `agent_id`; aliases resolve through a scan (rosters are
    /// small).
    agents: RwLock<HashMap<String, Agent>>,
    /// Registration order, for stable round-robin.
    order: RwLock<Vec<String>>,
}

impl AgentRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            agents: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Register a worker for this session.  Rejects duplicate aliases
    /// and a second supervisor role.  An existing non-retired store row
    /// with the same alias is adopted — XP and level carry over.
    pub fn register(&self, alias: &str, role: &str, model_ref: &str) -> Result<Agent> {
        if self.resolve(alias).is_some() {
            return Err(Error::Config(format!("duplicate alias '{alias}'")));
        }
        if role.trim().eq_ignore_ascii_case("supervisor")
            && self.list_all().iter().any(|a| a.is_supervisor())
        {
            return Err(Error::Config(
                "exactly one agent may hold the supervisor role".into(),
            ));
        }

        let agent = match self.store.get_agent(alias)? {
            Some(mut existing) => {
                existing.role = role.to_owned();
                existing.model_ref = model_ref.to_owned();
                existing.status = AgentStatus::Active;
                existing.status_reason = None;
                existing.status_expires_at = None;
                existing.updated_at = Utc::now();
                existing
            }
            None => Agent::new(alias, role, model_ref),
        };
        self.store.save_agent(&agent)?;

        self.agents
            .write()
            .insert(agent.agent_id.clone(), agent.clone());
        self.order.write().push(agent.agent_id.clone());
        Ok(agent)
    }

    /// Re-attach an agent loaded from the store (resume path): state is
    /// taken as-is, including sleeping/degraded statuses.
    pub fn attach(&self, agent: Agent) {
        self.agents
            .write()
            .insert(agent.agent_id.clone(), agent.clone());
        self.order.write().push(agent.agent_id);
    }

    /// Look up by alias or stable id.
    pub fn resolve(&self, alias_or_id: &str) -> Option<Agent> {
        let agents = self.agents.read();
        if let Some(a) = agents.get(alias_or_id) {
            return Some(a.clone());
        }
        agents.values().find(|a| a.alias == alias_or_id).cloned()
    }

    /// Supervisor-only: transition an agent's lifecycle state.
    pub fn set_status(
        &self,
        agent_id: &str,
        new_status: AgentStatus,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Agent> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::Other(format!("unknown agent '{agent_id}'")))?;

        TraceEvent::AgentStatusChanged {
            alias: agent.alias.clone(),
            from: agent.status.as_str().into(),
            to: new_status.as_str().into(),
            reason: reason.to_owned(),
        }
        .emit();

        agent.status = new_status;
        agent.status_reason = Some(reason.to_owned());
        agent.status_expires_at = expires_at;
        agent.updated_at = Utc::now();
        let snapshot = agent.clone();
        drop(agents);

        self.store.save_agent(&snapshot)?;
        Ok(snapshot)
    }

    /// Apply an XP delta (may be negative); the level is recomputed from
    /// the curve and both the event and the new row are persisted.
    pub fn award_xp(&self, agent_id: &str, delta: i64, reason: &str) -> Result<Agent> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| Error::Other(format!("unknown agent '{agent_id}'")))?;
        agent.apply_xp_delta(delta);
        let snapshot = agent.clone();
        drop(agents);

        self.store.record_xp_event(agent_id, delta, reason)?;
        self.store.save_agent(&snapshot)?;

        TraceEvent::XpAwarded {
            alias: snapshot.alias.clone(),
            delta,
            total: snapshot.xp,
            level: snapshot.level,
            reason: reason.to_owned(),
        }
        .emit();
        Ok(snapshot)
    }

    /// Agents eligible for scheduling, in registration order.
    pub fn list_active(&self) -> Vec<Agent> {
        self.in_order(|a| a.status == AgentStatus::Active)
    }

    pub fn list_all(&self) -> Vec<Agent> {
        self.in_order(|_| true)
    }

    fn in_order(&self, keep: impl Fn(&Agent) -> bool) -> Vec<Agent> {
        let agents = self.agents.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| agents.get(id))
            .filter(|a| keep(a))
            .cloned()
            .collect()
    }
}
