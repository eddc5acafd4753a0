//! The sandboxed tool runner: validates one operation against policy and
//! executes it inside the workspace.
//!
//! The runner never calls the parser or the scheduler, and it never
//! fails out of [`ToolRunner::run`] — policy violations come back as
//! `denied` results, internal faults as `error` results.

pub mod exec;
pub mod file_ops;
pub mod path;
pub mod sandbox;
pub mod shell;

use std::path::PathBuf;

use axe_domain::config::ToolPolicy;
use axe_domain::error::{Error, Result};
use axe_domain::operation::{Operation, OperationResult};

use sandbox::Sandbox;

pub struct ToolRunner {
    workspace_root: PathBuf,
    policy: ToolPolicy,
    sandbox: Sandbox,
}

impl ToolRunner {
    /// The workspace root must exist; it is canonicalized once so every
    /// containment check compares resolved paths.
    pub fn new(workspace_root: impl Into<PathBuf>, policy: ToolPolicy) -> Result<Self> {
        let raw: PathBuf = workspace_root.into();
        let workspace_root = raw.canonicalize().map_err(|e| {
            Error::Config(format!(
                "workspace root '{}' is not usable: {e}",
                raw.display()
            ))
        })?;
        let sandbox = Sandbox::new(policy.sandbox_mode);
        Ok(Self {
            workspace_root,
            policy,
            sandbox,
        })
    }

    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }

    /// One-time sandbox degradation warning, surfaced by the scheduler.
    pub fn take_sandbox_warning(&self) -> Option<String> {
        self.sandbox.take_warning()
    }

    /// Execute a single operation.  Infallible by contract.
    pub async fn run(&self, op: &Operation) -> OperationResult {
        match op {
            Operation::Read { path } => match self.resolve(path) {
                Ok(p) => file_ops::read(&p).await,
                Err(reason) => OperationResult::denied(reason),
            },
            Operation::ListDir { path } => match self.resolve(path) {
                Ok(p) => file_ops::list_dir(&p).await,
                Err(reason) => OperationResult::denied(reason),
            },
            Operation::Write { path, content } => match self.resolve_writable(path) {
                Ok(p) => file_ops::write(&p, content).await,
                Err(reason) => OperationResult::denied(reason),
            },
            Operation::Append { path, content } => match self.resolve_writable(path) {
                Ok(p) => file_ops::append(&p, content).await,
                Err(reason) => OperationResult::denied(reason),
            },
            Operation::Exec { command } => {
                exec::run_exec(command, &self.workspace_root, &self.policy, &self.sandbox).await
            }
        }
    }

    fn resolve(&self, requested: &str) -> std::result::Result<PathBuf, &'static str> {
        path::resolve(&self.workspace_root, requested, &self.policy)
    }

    fn resolve_writable(&self, requested: &str) -> std::result::Result<PathBuf, &'static str> {
        let resolved = self.resolve(requested)?;
        path::check_writable(&self.workspace_root, &resolved, &self.policy)?;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axe_domain::operation::OperationStatus;
    use tempfile::TempDir;

    fn runner() -> (TempDir, ToolRunner) {
        let dir = TempDir::new().unwrap();
        let runner = ToolRunner::new(dir.path(), ToolPolicy::default()).unwrap();
        (dir, runner)
    }

    #[tokio::test]
    async fn read_inside_workspace() {
        let (dir, runner) = runner();
        std::fs::write(dir.path().join("notes.md"), "hi").unwrap();
        let r = runner
            .run(&Operation::Read {
                path: "notes.md".into(),
            })
            .await;
        assert_eq!(r.status, OperationStatus::Ok);
        assert_eq!(r.text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn read_escape_attempt_is_denied() {
        let (_dir, runner) = runner();
        let r = runner
            .run(&Operation::Read {
                path: "/etc/passwd".into(),
            })
            .await;
        assert_eq!(r.status, OperationStatus::Denied);
        assert_eq!(r.error_message.as_deref(), Some("path_outside_workspace"));
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let (_dir, runner) = runner();
        let r = runner
            .run(&Operation::Write {
                path: "../evil.txt".into(),
                content: "x".into(),
            })
            .await;
        assert_eq!(r.status, OperationStatus::Denied);
    }

    #[tokio::test]
    async fn write_creates_parents_and_reports_bytes() {
        let (dir, runner) = runner();
        let r = runner
            .run(&Operation::Write {
                path: "out/report.md".into(),
                content: "content".into(),
            })
            .await;
        assert_eq!(r.status, OperationStatus::Ok);
        assert_eq!(r.bytes_written, Some(7));
        assert!(dir.path().join("out/report.md").exists());
    }

    #[tokio::test]
    async fn writable_paths_gate_writes_but_not_reads() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("src.txt"), "data").unwrap();
        let mut policy = ToolPolicy::default();
        policy.writable_paths.push(PathBuf::from("out"));
        let runner = ToolRunner::new(dir.path(), policy).unwrap();

        let read = runner
            .run(&Operation::Read {
                path: "src.txt".into(),
            })
            .await;
        assert_eq!(read.status, OperationStatus::Ok);

        let write = runner
            .run(&Operation::Write {
                path: "src.txt".into(),
                content: "clobber".into(),
            })
            .await;
        assert_eq!(write.status, OperationStatus::Denied);
        assert_eq!(write.error_message.as_deref(), Some("path_not_writable"));
    }

    #[tokio::test]
    async fn list_dir_operation() {
        let (dir, runner) = runner();
        std::fs::write(dir.path().join("a"), "").unwrap();
        let r = runner.run(&Operation::ListDir { path: ".".into() }).await;
        assert_eq!(r.status, OperationStatus::Ok);
        assert_eq!(r.text.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn missing_workspace_root_is_a_config_error() {
        let err = ToolRunner::new("/definitely/not/here", ToolPolicy::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
