//! Agent rows and the append-only XP event log.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use axe_domain::agent::{Agent, AgentStatus};
use axe_domain::error::{Error, Result};

use crate::Store;

/// Filter for [`Store::list_agents`].
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub status: Option<AgentStatus>,
    pub include_retired: bool,
}

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let status_str: String = row.get(6)?;
    let expires: Option<String> = row.get(8)?;
    Ok(Agent {
        agent_id: row.get(0)?,
        alias: row.get(1)?,
        model_ref: row.get(2)?,
        role: row.get(3)?,
        xp: row.get::<_, i64>(4)? as u64,
        level: row.get::<_, i64>(5)? as u32,
        status: AgentStatus::parse(&status_str).unwrap_or(AgentStatus::Retired),
        status_reason: row.get(7)?,
        status_expires_at: expires.and_then(|s| parse_ts(&s)),
        created_at: row
            .get::<_, String>(9)
            .map(|s| parse_ts(&s).unwrap_or_else(Utc::now))?,
        updated_at: row
            .get::<_, String>(10)
            .map(|s| parse_ts(&s).unwrap_or_else(Utc::now))?,
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

const AGENT_COLS: &str = "agent_id, alias, model_ref, role, xp, level, status, \
                          status_reason, status_expires_at, created_at, updated_at";

impl Store {
    /// Insert or update an agent row.
    pub fn save_agent(&self, agent: &Agent) -> Result<()> {
        self.with_write(|conn| {
            conn.execute(
                r#"
                INSERT INTO agents (agent_id, alias, model_ref, role, xp, level, status,
                                    status_reason, status_expires_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(agent_id) DO UPDATE SET
                    alias = ?2,
                    model_ref = ?3,
                    role = ?4,
                    xp = ?5,
                    level = ?6,
                    status = ?7,
                    status_reason = ?8,
                    status_expires_at = ?9,
                    updated_at = ?11
                "#,
                params![
                    agent.agent_id,
                    agent.alias,
                    agent.model_ref,
                    agent.role,
                    agent.xp as i64,
                    agent.level as i64,
                    agent.status.as_str(),
                    agent.status_reason,
                    agent.status_expires_at.map(|t| t.to_rfc3339()),
                    agent.created_at.to_rfc3339(),
                    agent.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Look an agent up by alias or by stable id.  Retired agents are
    /// only reachable by id — their alias may have been reused.
    pub fn get_agent(&self, alias_or_id: &str) -> Result<Option<Agent>> {
        self.with_read(|conn| {
            let by_id = conn
                .query_row(
                    &format!("SELECT {AGENT_COLS} FROM agents WHERE agent_id = ?1"),
                    [alias_or_id],
                    row_to_agent,
                )
                .optional()?;
            if by_id.is_some() {
                return Ok(by_id);
            }
            conn.query_row(
                &format!(
                    "SELECT {AGENT_COLS} FROM agents WHERE alias = ?1 AND status != 'retired'"
                ),
                [alias_or_id],
                row_to_agent,
            )
            .optional()
        })
    }

    pub fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLS} FROM agents ORDER BY created_at, alias"
            ))?;
            let agents = stmt
                .query_map([], row_to_agent)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(agents)
        })
        .map(|agents| {
            agents
                .into_iter()
                .filter(|a| {
                    if !filter.include_retired && a.status == AgentStatus::Retired {
                        return false;
                    }
                    filter.status.map_or(true, |s| a.status == s)
                })
                .collect()
        })
    }

    /// Append one XP delta to the event log.  The agent row itself is
    /// updated by the caller via [`Store::save_agent`].
    pub fn record_xp_event(&self, agent_id: &str, delta: i64, reason: &str) -> Result<()> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO xp_events (agent_id, delta, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![agent_id, delta, reason, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Sum of all persisted deltas for an agent.  Matches `agents.xp`
    /// (clamped at zero) by invariant.
    pub fn xp_total(&self, agent_id: &str) -> Result<i64> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(delta), 0) FROM xp_events WHERE agent_id = ?1",
                [agent_id],
                |row| row.get(0),
            )
        })
    }

    /// Verify `alias` is free among non-retired agents.
    pub fn alias_available(&self, alias: &str) -> Result<bool> {
        self.with_read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM agents WHERE alias = ?1 AND status != 'retired'",
                [alias],
                |row| row.get(0),
            )?;
            Ok(count == 0)
        })
    }

    /// Like [`Store::get_agent`] but failing when the agent is unknown.
    pub fn require_agent(&self, alias_or_id: &str) -> Result<Agent> {
        self.get_agent(alias_or_id)?
            .ok_or_else(|| Error::Store(format!("unknown agent '{alias_or_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let agent = Agent::new("llama1", "builder", "ollama/llama3");
        store.save_agent(&agent).unwrap();

        let by_alias = store.get_agent("llama1").unwrap().unwrap();
        assert_eq!(by_alias.agent_id, agent.agent_id);
        let by_id = store.get_agent(&agent.agent_id).unwrap().unwrap();
        assert_eq!(by_id.alias, "llama1");
    }

    #[test]
    fn retired_agents_hide_from_alias_lookup() {
        let store = Store::open_in_memory().unwrap();
        let mut agent = Agent::new("llama1", "builder", "m");
        agent.status = AgentStatus::Retired;
        store.save_agent(&agent).unwrap();

        assert!(store.get_agent("llama1").unwrap().is_none());
        assert!(store.get_agent(&agent.agent_id).unwrap().is_some());
        assert!(store.alias_available("llama1").unwrap());
    }

    #[test]
    fn list_agents_filters_by_status() {
        let store = Store::open_in_memory().unwrap();
        let a = Agent::new("a", "r", "m");
        let mut b = Agent::new("b", "r", "m");
        b.status = AgentStatus::Sleeping;
        store.save_agent(&a).unwrap();
        store.save_agent(&b).unwrap();

        let sleeping = store
            .list_agents(&AgentFilter {
                status: Some(AgentStatus::Sleeping),
                include_retired: false,
            })
            .unwrap();
        assert_eq!(sleeping.len(), 1);
        assert_eq!(sleeping[0].alias, "b");
    }

    #[test]
    fn xp_total_is_the_sum_of_deltas() {
        let store = Store::open_in_memory().unwrap();
        let agent = Agent::new("llama1", "builder", "m");
        store.save_agent(&agent).unwrap();

        store.record_xp_event(&agent.agent_id, 100, "task done").unwrap();
        store.record_xp_event(&agent.agent_id, -30, "regression").unwrap();
        store.record_xp_event(&agent.agent_id, 15, "review").unwrap();
        assert_eq!(store.xp_total(&agent.agent_id).unwrap(), 85);
    }
}
