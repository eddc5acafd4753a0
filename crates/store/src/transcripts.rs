//! Transcript persistence: append-only rows keyed by
//! `(session_id, turn_index)`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use axe_domain::error::Result;
use axe_domain::operation::{EntryKind, TranscriptEntry};

use crate::Store;

fn kind_to_str(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Message => "message",
        EntryKind::OperationResult => "operation_result",
        EntryKind::SystemNote => "system_note",
        EntryKind::CompressedSummary => "compressed_summary",
    }
}

fn kind_from_str(s: &str) -> EntryKind {
    match s {
        "operation_result" => EntryKind::OperationResult,
        "system_note" => EntryKind::SystemNote,
        "compressed_summary" => EntryKind::CompressedSummary,
        _ => EntryKind::Message,
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<TranscriptEntry> {
    let kind: String = row.get(3)?;
    let created: String = row.get(6)?;
    let covered_start: Option<i64> = row.get(7)?;
    let covered_end: Option<i64> = row.get(8)?;
    Ok(TranscriptEntry {
        turn_index: row.get::<_, i64>(0)? as u64,
        logical_turn: row.get::<_, i64>(1)? as u64,
        author: row.get(2)?,
        kind: kind_from_str(&kind),
        body: row.get(4)?,
        token_count: row.get::<_, i64>(5)? as u64,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        covered_range: match (covered_start, covered_end) {
            (Some(s), Some(e)) => Some((s as u64, e as u64)),
            _ => None,
        },
    })
}

impl Store {
    /// Append one entry; the store assigns and returns the next
    /// `turn_index`.  Insert + index assignment run in one transaction so
    /// a crash can never leave a gap or a torn row.
    pub fn append_transcript(
        &self,
        session_id: &str,
        entry: &TranscriptEntry,
    ) -> Result<u64> {
        self.with_write(|conn| {
            let tx = conn.unchecked_transaction()?;
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(turn_index) + 1, 0) FROM transcript_entries
                 WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )?;
            tx.execute(
                r#"
                INSERT INTO transcript_entries
                    (session_id, turn_index, logical_turn, author, kind, body,
                     token_count, created_at, covered_start, covered_end)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    session_id,
                    next,
                    entry.logical_turn as i64,
                    entry.author,
                    kind_to_str(entry.kind),
                    entry.body,
                    entry.token_count as i64,
                    entry.created_at.to_rfc3339(),
                    entry.covered_range.map(|(s, _)| s as i64),
                    entry.covered_range.map(|(_, e)| e as i64),
                ],
            )?;
            tx.commit()?;
            Ok(next as u64)
        })
    }

    /// Load entries ordered by turn index, optionally restricted to an
    /// inclusive range.
    pub fn load_transcript(
        &self,
        session_id: &str,
        range: Option<(u64, u64)>,
    ) -> Result<Vec<TranscriptEntry>> {
        self.with_read(|conn| {
            let (lo, hi) = match range {
                Some((lo, hi)) => (lo as i64, hi as i64),
                None => (0, i64::MAX),
            };
            let mut stmt = conn.prepare(
                r#"
                SELECT turn_index, logical_turn, author, kind, body, token_count,
                       created_at, covered_start, covered_end
                FROM transcript_entries
                WHERE session_id = ?1 AND turn_index BETWEEN ?2 AND ?3
                ORDER BY turn_index
                "#,
            )?;
            let entries = stmt
                .query_map(params![session_id, lo, hi], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    pub fn transcript_len(&self, session_id: &str) -> Result<u64> {
        self.with_read(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM transcript_entries WHERE session_id = ?1",
                [session_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// Replace a contiguous range with a single compressed-summary entry.
    ///
    /// The summary keeps the start index of the range it covers, so
    /// compression is idempotent and the original range remains
    /// reconstructible from `covered_start/covered_end`.
    pub fn replace_transcript_range(
        &self,
        session_id: &str,
        summary: &TranscriptEntry,
    ) -> Result<()> {
        let (start, end) = summary.covered_range.ok_or_else(|| {
            axe_domain::error::Error::Store(
                "compressed summary is missing its covered range".into(),
            )
        })?;
        self.with_write(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM transcript_entries
                 WHERE session_id = ?1 AND turn_index BETWEEN ?2 AND ?3",
                params![session_id, start as i64, end as i64],
            )?;
            tx.execute(
                r#"
                INSERT INTO transcript_entries
                    (session_id, turn_index, logical_turn, author, kind, body,
                     token_count, created_at, covered_start, covered_end)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    session_id,
                    start as i64,
                    summary.logical_turn as i64,
                    summary.author,
                    kind_to_str(summary.kind),
                    summary.body,
                    summary.token_count as i64,
                    summary.created_at.to_rfc3339(),
                    start as i64,
                    end as i64,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(author: &str, kind: EntryKind, body: &str) -> TranscriptEntry {
        TranscriptEntry::new(author, kind, body)
    }

    #[test]
    fn append_assigns_sequential_indices() {
        let store = Store::open_in_memory().unwrap();
        let i0 = store
            .append_transcript("s1", &entry("llama1", EntryKind::Message, "hello"))
            .unwrap();
        let i1 = store
            .append_transcript("s1", &entry("tool", EntryKind::OperationResult, "[read ok]"))
            .unwrap();
        assert_eq!((i0, i1), (0, 1));
        // Indices are per-session.
        let j0 = store
            .append_transcript("s2", &entry("system", EntryKind::SystemNote, "boot"))
            .unwrap();
        assert_eq!(j0, 0);
    }

    #[test]
    fn write_then_read_returns_identical_entry() {
        let store = Store::open_in_memory().unwrap();
        let mut e = entry("llama1", EntryKind::Message, "body text");
        e.logical_turn = 7;
        store.append_transcript("s1", &e).unwrap();

        let loaded = store.load_transcript("s1", None).unwrap();
        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];
        assert_eq!(got.author, "llama1");
        assert_eq!(got.kind, EntryKind::Message);
        assert_eq!(got.body, "body text");
        assert_eq!(got.logical_turn, 7);
        assert_eq!(got.token_count, e.token_count);
    }

    #[test]
    fn range_load_is_inclusive() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append_transcript("s1", &entry("a", EntryKind::Message, &format!("m{i}")))
                .unwrap();
        }
        let mid = store.load_transcript("s1", Some((1, 3))).unwrap();
        assert_eq!(mid.len(), 3);
        assert_eq!(mid[0].body, "m1");
        assert_eq!(mid[2].body, "m3");
    }

    #[test]
    fn replace_range_keeps_covered_bounds() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..6 {
            store
                .append_transcript("s1", &entry("a", EntryKind::Message, &format!("m{i}")))
                .unwrap();
        }
        let mut summary = entry("system", EntryKind::CompressedSummary, "earlier work: m0..m3");
        summary.covered_range = Some((0, 3));
        store.replace_transcript_range("s1", &summary).unwrap();

        let loaded = store.load_transcript("s1", None).unwrap();
        assert_eq!(loaded.len(), 3); // summary + m4 + m5
        assert_eq!(loaded[0].kind, EntryKind::CompressedSummary);
        assert_eq!(loaded[0].covered_range, Some((0, 3)));
        assert_eq!(loaded[1].body, "m4");
        // New appends continue after the surviving tail.
        let next = store
            .append_transcript("s1", &entry("a", EntryKind::Message, "m6"))
            .unwrap();
        assert_eq!(next, 6);
    }
}
