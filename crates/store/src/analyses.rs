//! Workshop analysis artifacts.  Written once, never updated; the core
//! only stores and aggregates them.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use axe_domain::error::Result;

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Completed,
    Failed,
}

impl AnalysisStatus {
    fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub tool_name: String,
    pub target: String,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub results_json: serde_json::Value,
    pub status: AnalysisStatus,
    pub duration_s: f64,
    pub error_message: Option<String>,
}

impl AnalysisRecord {
    pub fn new(
        tool_name: impl Into<String>,
        target: impl Into<String>,
        results: serde_json::Value,
        status: AnalysisStatus,
        duration_s: f64,
    ) -> Self {
        Self {
            analysis_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            target: target.into(),
            agent_id: None,
            timestamp: Utc::now(),
            results_json: results,
            status,
            duration_s,
            error_message: None,
        }
    }
}

/// Aggregate per-tool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub count: u64,
    pub avg_duration_s: f64,
    pub ok: u64,
    pub fail: u64,
}

fn row_to_analysis(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let ts: String = row.get(4)?;
    let results: String = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(AnalysisRecord {
        analysis_id: row.get(0)?,
        tool_name: row.get(1)?,
        target: row.get(2)?,
        agent_id: row.get(3)?,
        timestamp: DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        results_json: serde_json::from_str(&results).unwrap_or(serde_json::Value::Null),
        status: if status == "failed" {
            AnalysisStatus::Failed
        } else {
            AnalysisStatus::Completed
        },
        duration_s: row.get(7)?,
        error_message: row.get(8)?,
    })
}

impl Store {
    /// Persist an analysis artifact; returns its id.
    pub fn save_analysis(&self, record: &AnalysisRecord) -> Result<String> {
        let results = record.results_json.to_string();
        self.with_write(|conn| {
            conn.execute(
                r#"
                INSERT INTO analyses
                    (analysis_id, tool_name, target, agent_id, timestamp,
                     results_json, status, duration_s, error_message)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    record.analysis_id,
                    record.tool_name,
                    record.target,
                    record.agent_id,
                    record.timestamp.to_rfc3339(),
                    results,
                    record.status.as_str(),
                    record.duration_s,
                    record.error_message,
                ],
            )?;
            Ok(())
        })?;
        Ok(record.analysis_id.clone())
    }

    pub fn list_analyses(
        &self,
        tool_name: Option<&str>,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT analysis_id, tool_name, target, agent_id, timestamp,
                       results_json, status, duration_s, error_message
                FROM analyses
                WHERE (?1 IS NULL OR tool_name = ?1)
                  AND (?2 IS NULL OR agent_id = ?2)
                ORDER BY timestamp DESC
                LIMIT ?3
                "#,
            )?;
            let rows = stmt
                .query_map(params![tool_name, agent_id, limit as i64], row_to_analysis)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Per-tool aggregate: run counts, mean duration, ok/fail split.
    pub fn stats_by_tool(&self, agent_id: Option<&str>) -> Result<BTreeMap<String, ToolStats>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT tool_name,
                       COUNT(*),
                       AVG(duration_s),
                       SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                       SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END)
                FROM analyses
                WHERE (?1 IS NULL OR agent_id = ?1)
                GROUP BY tool_name
                "#,
            )?;
            let mut stats = BTreeMap::new();
            let rows = stmt.query_map(params![agent_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ToolStats {
                        count: row.get::<_, i64>(1)? as u64,
                        avg_duration_s: row.get::<_, f64>(2)?,
                        ok: row.get::<_, i64>(3)? as u64,
                        fail: row.get::<_, i64>(4)? as u64,
                    },
                ))
            })?;
            for row in rows {
                let (tool, s) = row?;
                stats.insert(tool, s);
            }
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tool: &str, status: AnalysisStatus, duration: f64) -> AnalysisRecord {
        AnalysisRecord::new(tool, "src/", serde_json::json!({"issues": 0}), status, duration)
    }

    #[test]
    fn save_and_list_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut rec = record("lint", AnalysisStatus::Completed, 1.5);
        rec.agent_id = Some("agent-1".into());
        let id = store.save_analysis(&rec).unwrap();
        assert_eq!(id, rec.analysis_id);

        let all = store.list_analyses(None, None, 10).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tool_name, "lint");

        let by_agent = store.list_analyses(None, Some("agent-1"), 10).unwrap();
        assert_eq!(by_agent.len(), 1);
        let none = store.list_analyses(Some("profiler"), None, 10).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn stats_aggregate_ok_and_fail() {
        let store = Store::open_in_memory().unwrap();
        store.save_analysis(&record("lint", AnalysisStatus::Completed, 1.0)).unwrap();
        store.save_analysis(&record("lint", AnalysisStatus::Failed, 3.0)).unwrap();
        store.save_analysis(&record("audit", AnalysisStatus::Completed, 2.0)).unwrap();

        let stats = store.stats_by_tool(None).unwrap();
        let lint = &stats["lint"];
        assert_eq!(lint.count, 2);
        assert_eq!(lint.ok, 1);
        assert_eq!(lint.fail, 1);
        assert!((lint.avg_duration_s - 2.0).abs() < f64::EPSILON);
        assert_eq!(stats["audit"].count, 1);
    }
}
