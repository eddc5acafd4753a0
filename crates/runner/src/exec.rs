//! Shell/process execution for `Exec` operations.
//!
//! The raw command string is executed byte-for-byte: through `sh -c`
//! when it uses shell syntax, as a directly spawned argv otherwise.
//! Validation happened on the derived view (see [`crate::shell`]); this
//! module only runs what was approved.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use axe_domain::config::ToolPolicy;
use axe_domain::operation::OperationResult;

use crate::sandbox::Sandbox;
use crate::shell;

/// Validate and execute one command.
pub async fn run_exec(
    command: &str,
    workspace_root: &Path,
    policy: &ToolPolicy,
    sandbox: &Sandbox,
) -> OperationResult {
    if let Err(reason) = shell::validate(command, policy) {
        tracing::info!(%reason, command, "exec denied");
        return OperationResult::denied(reason);
    }
    tracing::info!(command, "exec");

    let argv = if shell::needs_shell(command) {
        vec!["sh".to_owned(), "-c".to_owned(), command.to_owned()]
    } else {
        let words = shell::split_words(command);
        if words.is_empty() {
            return OperationResult::error("empty command");
        }
        words
    };
    let argv = sandbox.wrap(workspace_root, argv);

    // The timeout keys off the first command name in the pipeline.
    let timeout = shell::split_commands(&shell::strip_heredocs(command))
        .first()
        .and_then(|seg| shell::extract_command_name(seg))
        .map(|name| policy.timeout_for(&name))
        .unwrap_or(Duration::from_secs(policy.execution_timeout_seconds));

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .current_dir(workspace_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return OperationResult::error(format!("failed to spawn: {e}")),
    };
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let duration_s = started.elapsed().as_secs_f64();
            let stdout = truncate_output(&output.stdout, policy.max_output_bytes);
            let stderr = truncate_output(&output.stderr, policy.max_output_bytes);
            let exit_code = output.status.code().unwrap_or(-1);
            OperationResult::ok_exec(stdout, stderr, exit_code, duration_s)
        }
        Ok(Err(e)) => OperationResult::error(format!("process error: {e}")),
        Err(_) => {
            // Dropping the future killed the direct child; take the rest
            // of the process group down with it.
            #[cfg(unix)]
            if let Some(pid) = pid {
                unsafe {
                    libc::killpg(pid as libc::pid_t, libc::SIGKILL);
                }
            }
            #[cfg(not(unix))]
            let _ = pid;
            OperationResult::error("timeout")
        }
    }
}

/// Lossy-decode captured output, enforcing the byte budget with a
/// trailing marker.
fn truncate_output(bytes: &[u8], budget: usize) -> String {
    if bytes.len() <= budget {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut s = String::from_utf8_lossy(&bytes[..budget]).into_owned();
    s.push_str("\n… [truncated]");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use axe_domain::config::SandboxMode;
    use axe_domain::operation::OperationStatus;
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf, ToolPolicy, Sandbox) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root, ToolPolicy::default(), Sandbox::new(SandboxMode::PathCheck))
    }

    #[tokio::test]
    async fn direct_command_captures_stdout() {
        let (_d, root, policy, sandbox) = setup();
        let r = run_exec("echo hello", &root, &policy, &sandbox).await;
        assert_eq!(r.status, OperationStatus::Ok);
        assert_eq!(r.stdout.as_deref().map(str::trim), Some("hello"));
        assert_eq!(r.exit_code, Some(0));
    }

    #[tokio::test]
    async fn pipeline_runs_through_the_shell() {
        let (_d, root, policy, sandbox) = setup();
        std::fs::write(root.join("f.txt"), "alpha\nbeta\n").unwrap();
        let r = run_exec("cat f.txt | grep alpha", &root, &policy, &sandbox).await;
        assert_eq!(r.status, OperationStatus::Ok);
        assert_eq!(r.stdout.as_deref().map(str::trim), Some("alpha"));
    }

    #[tokio::test]
    async fn denied_command_is_not_spawned() {
        let (_d, root, policy, sandbox) = setup();
        let r = run_exec("curl http://example.com", &root, &policy, &sandbox).await;
        assert_eq!(r.status, OperationStatus::Denied);
        assert!(r.error_message.unwrap().contains("curl"));
    }

    #[tokio::test]
    async fn heredoc_executes_byte_for_byte() {
        let (_d, root, policy, sandbox) = setup();
        let cmd = "cat > out.md << 'EOF'\n# Title\n- a\nEOF";
        let r = run_exec(cmd, &root, &policy, &sandbox).await;
        assert_eq!(r.status, OperationStatus::Ok, "{:?}", r.error_message);
        let written = std::fs::read_to_string(root.join("out.md")).unwrap();
        assert_eq!(written, "# Title\n- a\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_with_stderr() {
        let (_d, root, policy, sandbox) = setup();
        let r = run_exec("cat does_not_exist.txt", &root, &policy, &sandbox).await;
        assert_eq!(r.status, OperationStatus::Error);
        assert_ne!(r.exit_code, Some(0));
        assert!(!r.stderr.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let (_d, root, mut policy, _sandbox) = setup();
        policy.allow_list.insert("sleep".into());
        policy.per_tool_timeouts.insert("sleep".into(), 1);
        let sandbox = Sandbox::new(SandboxMode::PathCheck);
        let started = Instant::now();
        let r = run_exec("sleep 30", &root, &policy, &sandbox).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(r.status, OperationStatus::Error);
        assert_eq!(r.error_message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn same_command_runs_identically_regardless_of_validation_path() {
        // run(c) == run(c): the validation view never leaks into
        // execution.
        let (_d, root, policy, sandbox) = setup();
        let cmd = "cat > h.txt << 'EOF'\npayload\nEOF";
        let _ = run_exec(cmd, &root, &policy, &sandbox).await;
        let first = std::fs::read_to_string(root.join("h.txt")).unwrap();
        let _ = run_exec(cmd, &root, &policy, &sandbox).await;
        let second = std::fs::read_to_string(root.join("h.txt")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "payload\n");
    }

    #[test]
    fn truncation_appends_marker() {
        let out = truncate_output(&vec![b'x'; 100], 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.ends_with("[truncated]"));
        let small = truncate_output(b"tiny", 10);
        assert_eq!(small, "tiny");
    }
}
