use rusqlite::Connection;

use axe_domain::error::{Error, Result};

/// Schema version (increment when changing table definitions).
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables if absent and stamp the schema version.
///
/// Idempotent: safe to run on every open.  Opening a database written by
/// a **newer** build fails instead of guessing at the layout.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::Store(e.to_string()))?;

    if current > SCHEMA_VERSION {
        return Err(Error::Store(format!(
            "database schema version {current} is newer than supported version {SCHEMA_VERSION}; \
             refusing to open"
        )));
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            alias TEXT NOT NULL,
            model_ref TEXT NOT NULL,
            role TEXT NOT NULL,
            xp INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            status_reason TEXT,
            status_expires_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS xp_events (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL,
            delta INTEGER NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (agent_id) REFERENCES agents(agent_id)
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            workspace_root TEXT NOT NULL,
            active_agents TEXT NOT NULL,
            time_budget_seconds INTEGER NOT NULL,
            token_budget_total INTEGER NOT NULL,
            tokens_used INTEGER NOT NULL DEFAULT 0,
            github_enabled INTEGER NOT NULL DEFAULT 0,
            policy_json TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT,
            end_status TEXT,
            fatal_cause TEXT
        );

        CREATE TABLE IF NOT EXISTS transcript_entries (
            session_id TEXT NOT NULL,
            turn_index INTEGER NOT NULL,
            logical_turn INTEGER NOT NULL,
            author TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            token_count INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            covered_start INTEGER,
            covered_end INTEGER,
            PRIMARY KEY (session_id, turn_index),
            FOREIGN KEY (session_id) REFERENCES sessions(session_id)
        );

        CREATE TABLE IF NOT EXISTS analyses (
            analysis_id TEXT PRIMARY KEY,
            tool_name TEXT NOT NULL,
            target TEXT NOT NULL,
            agent_id TEXT,
            timestamp TEXT NOT NULL,
            results_json TEXT NOT NULL,
            status TEXT NOT NULL,
            duration_s REAL NOT NULL,
            error_message TEXT
        );

        CREATE TABLE IF NOT EXISTS supervisor_timers (
            agent_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            PRIMARY KEY (agent_id, kind)
        );

        CREATE INDEX IF NOT EXISTS idx_agents_alias ON agents(alias);
        CREATE INDEX IF NOT EXISTS idx_xp_agent ON xp_events(agent_id);
        CREATE INDEX IF NOT EXISTS idx_transcript_session
            ON transcript_entries(session_id, turn_index);
        CREATE INDEX IF NOT EXISTS idx_analyses_tool ON analyses(tool_name);
        CREATE INDEX IF NOT EXISTS idx_analyses_agent ON analyses(agent_id);
        "#,
    )
    .map_err(|e| Error::Store(e.to_string()))?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])
        .map_err(|e| Error::Store(e.to_string()))?;

    Ok(())
}
