//! Pending supervisor timers (sleep/break expiries), persisted so resume
//! can rebuild in-flight state transitions.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use axe_domain::error::Result;

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerRecord {
    pub agent_id: String,
    /// `"sleep"` or `"break"`.
    pub kind: String,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    pub fn save_timer(&self, timer: &TimerRecord) -> Result<()> {
        self.with_write(|conn| {
            conn.execute(
                r#"
                INSERT INTO supervisor_timers (agent_id, kind, expires_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(agent_id, kind) DO UPDATE SET expires_at = ?3
                "#,
                params![timer.agent_id, timer.kind, timer.expires_at.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn clear_timer(&self, agent_id: &str, kind: &str) -> Result<()> {
        self.with_write(|conn| {
            conn.execute(
                "DELETE FROM supervisor_timers WHERE agent_id = ?1 AND kind = ?2",
                params![agent_id, kind],
            )?;
            Ok(())
        })
    }

    pub fn pending_timers(&self) -> Result<Vec<TimerRecord>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT agent_id, kind, expires_at FROM supervisor_timers ORDER BY expires_at",
            )?;
            let timers = stmt
                .query_map([], |row| {
                    let ts: String = row.get(2)?;
                    Ok(TimerRecord {
                        agent_id: row.get(0)?,
                        kind: row.get(1)?,
                        expires_at: DateTime::parse_from_rfc3339(&ts)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(timers)
        })
    }
}
