//! Parsed operations, their results, and transcript entries.
//!
//! An [`Operation`] is a decoded-but-not-yet-executed tool call.  The
//! parser produces them from agent replies; the runner consumes them and
//! returns an [`OperationResult`].  Both are transient — only the
//! resulting [`TranscriptEntry`] is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single executable file/shell operation decoded from an agent reply.
///
/// Paths are carried verbatim as the agent emitted them (after surface
/// cleanup of quotes/backticks); resolution and policy are the runner's
/// job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Read { path: String },
    Write { path: String, content: String },
    Append { path: String, content: String },
    Exec { command: String },
    ListDir { path: String },
}

impl Operation {
    /// Short tag used in transcripts and stats.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Operation::Read { .. } => "read",
            Operation::Write { .. } => "write",
            Operation::Append { .. } => "append",
            Operation::Exec { .. } => "exec",
            Operation::ListDir { .. } => "list_dir",
        }
    }

    /// Stable fingerprint over the tag and all arguments.
    ///
    /// Two operations with the same fingerprint are the *same call*
    /// regardless of which surface form produced them; the parser uses
    /// this for order-preserving deduplication.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind_str().as_bytes());
        hasher.update([0u8]);
        match self {
            Operation::Read { path } | Operation::ListDir { path } => {
                hasher.update(path.as_bytes());
            }
            Operation::Write { path, content } | Operation::Append { path, content } => {
                hasher.update(path.as_bytes());
                hasher.update([0u8]);
                hasher.update(content.as_bytes());
            }
            Operation::Exec { command } => {
                hasher.update(command.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OperationResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Ok,
    Denied,
    Error,
}

/// Outcome of executing an [`Operation`].
///
/// Fields are populated per operation kind: `text` for reads,
/// `bytes_written` for writes/appends, the stdio triple for execs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl OperationResult {
    fn empty(status: OperationStatus) -> Self {
        Self {
            status,
            text: None,
            bytes_written: None,
            stdout: None,
            stderr: None,
            exit_code: None,
            duration_s: None,
            error_message: None,
        }
    }

    pub fn ok_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(OperationStatus::Ok)
        }
    }

    pub fn ok_write(bytes_written: u64) -> Self {
        Self {
            bytes_written: Some(bytes_written),
            ..Self::empty(OperationStatus::Ok)
        }
    }

    pub fn ok_exec(stdout: String, stderr: String, exit_code: i32, duration_s: f64) -> Self {
        let status = if exit_code == 0 {
            OperationStatus::Ok
        } else {
            OperationStatus::Error
        };
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code: Some(exit_code),
            duration_s: Some(duration_s),
            ..Self::empty(status)
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            error_message: Some(reason.into()),
            ..Self::empty(OperationStatus::Denied)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::empty(OperationStatus::Error)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }

    /// Human-readable body for the transcript entry.
    pub fn render(&self, op: &Operation) -> String {
        let head = match self.status {
            OperationStatus::Ok => "ok",
            OperationStatus::Denied => "denied",
            OperationStatus::Error => "error",
        };
        let mut body = format!("[{} {}]", op.kind_str(), head);
        if let Some(msg) = &self.error_message {
            body.push_str(&format!(" {msg}"));
        }
        if let Some(code) = self.exit_code {
            body.push_str(&format!(" exit={code}"));
        }
        if let Some(text) = &self.text {
            body.push('\n');
            body.push_str(text);
        }
        if let Some(out) = &self.stdout {
            if !out.is_empty() {
                body.push('\n');
                body.push_str(out);
            }
        }
        if let Some(err) = &self.stderr {
            if !err.is_empty() {
                body.push_str("\n[stderr]\n");
                body.push_str(err);
            }
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    OperationResult,
    SystemNote,
    CompressedSummary,
}

/// One line of the shared session transcript.
///
/// `turn_index` is the append position; `logical_turn` is the scheduler's
/// selection-order stamp (identical under serial scheduling, preserved for
/// replay when dispatch is parallel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub turn_index: u64,
    pub logical_turn: u64,
    /// Agent alias, `"system"`, or `"tool"`.
    pub author: String,
    pub kind: EntryKind,
    pub body: String,
    pub token_count: u64,
    pub created_at: DateTime<Utc>,
    /// Only on `CompressedSummary`: the `(start_turn, end_turn)` range the
    /// summary replaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covered_range: Option<(u64, u64)>,
}

impl TranscriptEntry {
    pub fn new(author: impl Into<String>, kind: EntryKind, body: impl Into<String>) -> Self {
        let body = body.into();
        let token_count = estimate_tokens(&body);
        Self {
            turn_index: 0,
            logical_turn: 0,
            author: author.into(),
            kind,
            body,
            token_count,
            created_at: Utc::now(),
            covered_range: None,
        }
    }
}

/// Cheap token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64 + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_across_clones() {
        let a = Operation::Exec {
            command: "ls -la".into(),
        };
        let b = Operation::Exec {
            command: "ls -la".into(),
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_by_kind_and_args() {
        let read = Operation::Read {
            path: "notes.md".into(),
        };
        let list = Operation::ListDir {
            path: "notes.md".into(),
        };
        assert_ne!(read.fingerprint(), list.fingerprint());

        let w1 = Operation::Write {
            path: "a".into(),
            content: "b\0c".into(),
        };
        let w2 = Operation::Write {
            path: "a\0b".into(),
            content: "c".into(),
        };
        assert_ne!(w1.fingerprint(), w2.fingerprint());
    }

    #[test]
    fn exec_nonzero_exit_is_error_status() {
        let r = OperationResult::ok_exec(String::new(), "boom".into(), 2, 0.1);
        assert_eq!(r.status, OperationStatus::Error);
        let r = OperationResult::ok_exec("fine".into(), String::new(), 0, 0.1);
        assert!(r.is_ok());
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn render_includes_denial_reason() {
        let op = Operation::Read {
            path: "/etc/passwd".into(),
        };
        let r = OperationResult::denied("path_outside_workspace");
        let body = r.render(&op);
        assert!(body.contains("[read denied]"));
        assert!(body.contains("path_outside_workspace"));
    }
}
