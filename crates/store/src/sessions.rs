//! Session rows: budgets, policy snapshot, and end state for resume.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use axe_domain::config::ToolPolicy;
use axe_domain::error::{Error, Result};

use crate::Store;

/// The persisted form of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub workspace_root: String,
    pub active_agents: Vec<String>,
    pub time_budget_seconds: u64,
    pub token_budget_total: u64,
    pub tokens_used: u64,
    pub github_enabled: bool,
    pub policy: ToolPolicy,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_status: Option<String>,
    pub fatal_cause: Option<String>,
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let agents_json: String = row.get(2)?;
    let policy_json: String = row.get(7)?;
    let started: String = row.get(8)?;
    let ended: Option<String> = row.get(9)?;
    Ok(SessionRecord {
        session_id: row.get(0)?,
        workspace_root: row.get(1)?,
        active_agents: serde_json::from_str(&agents_json).unwrap_or_default(),
        time_budget_seconds: row.get::<_, i64>(3)? as u64,
        token_budget_total: row.get::<_, i64>(4)? as u64,
        tokens_used: row.get::<_, i64>(5)? as u64,
        github_enabled: row.get::<_, i64>(6)? != 0,
        policy: serde_json::from_str(&policy_json).unwrap_or_default(),
        started_at: parse_ts(&started),
        ended_at: ended.map(|s| parse_ts(&s)),
        end_status: row.get(10)?,
        fatal_cause: row.get(11)?,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Store {
    pub fn save_session(&self, session: &SessionRecord) -> Result<()> {
        let agents_json = serde_json::to_string(&session.active_agents)
            .map_err(|e| Error::Store(format!("serializing agent list: {e}")))?;
        let policy_json = serde_json::to_string(&session.policy)
            .map_err(|e| Error::Store(format!("serializing policy: {e}")))?;
        self.with_write(move |conn| {
            conn.execute(
                r#"
                INSERT INTO sessions
                    (session_id, workspace_root, active_agents, time_budget_seconds,
                     token_budget_total, tokens_used, github_enabled, policy_json,
                     started_at, ended_at, end_status, fatal_cause)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(session_id) DO UPDATE SET
                    tokens_used = ?6,
                    ended_at = ?10,
                    end_status = ?11,
                    fatal_cause = ?12
                "#,
                params![
                    session.session_id,
                    session.workspace_root,
                    agents_json,
                    session.time_budget_seconds as i64,
                    session.token_budget_total as i64,
                    session.tokens_used as i64,
                    session.github_enabled as i64,
                    policy_json,
                    session.started_at.to_rfc3339(),
                    session.ended_at.map(|t| t.to_rfc3339()),
                    session.end_status,
                    session.fatal_cause,
                ],
            )?;
            Ok(())
        })
    }

    pub fn resume_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.with_read(|conn| {
            conn.query_row(
                r#"
                SELECT session_id, workspace_root, active_agents, time_budget_seconds,
                       token_budget_total, tokens_used, github_enabled, policy_json,
                       started_at, ended_at, end_status, fatal_cause
                FROM sessions WHERE session_id = ?1
                "#,
                [session_id],
                row_to_session,
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let record = SessionRecord {
            session_id: "s1".into(),
            workspace_root: "/tmp/ws".into(),
            active_agents: vec!["llama1".into(), "argus".into()],
            time_budget_seconds: 600,
            token_budget_total: 100_000,
            tokens_used: 1234,
            github_enabled: true,
            policy: ToolPolicy::default(),
            started_at: Utc::now(),
            ended_at: None,
            end_status: None,
            fatal_cause: None,
        };
        store.save_session(&record).unwrap();

        let loaded = store.resume_session("s1").unwrap().unwrap();
        assert_eq!(loaded.active_agents, record.active_agents);
        assert_eq!(loaded.tokens_used, 1234);
        assert!(loaded.github_enabled);
        assert!(loaded.ended_at.is_none());
        assert!(store.resume_session("missing").unwrap().is_none());
    }

    #[test]
    fn ended_at_is_set_once_via_update() {
        let store = Store::open_in_memory().unwrap();
        let mut record = SessionRecord {
            session_id: "s1".into(),
            workspace_root: "/tmp/ws".into(),
            active_agents: vec![],
            time_budget_seconds: 1,
            token_budget_total: 1,
            tokens_used: 0,
            github_enabled: false,
            policy: ToolPolicy::default(),
            started_at: Utc::now(),
            ended_at: None,
            end_status: None,
            fatal_cause: None,
        };
        store.save_session(&record).unwrap();

        record.ended_at = Some(Utc::now());
        record.end_status = Some("token_budget_exhausted".into());
        store.save_session(&record).unwrap();

        let loaded = store.resume_session("s1").unwrap().unwrap();
        assert!(loaded.ended_at.is_some());
        assert_eq!(loaded.end_status.as_deref(), Some("token_budget_exhausted"));
    }
}
