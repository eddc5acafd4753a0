//! Namespace isolation via bubblewrap, with graceful fallback.
//!
//! In `namespace` mode every exec is wrapped in `bwrap`: read-only root
//! filesystem, the workspace bound read-write, no network, a fresh
//! process namespace that dies with the parent.  When the helper is not
//! installed the runner degrades to `path_check` and surfaces a one-time
//! warning for the transcript.

use std::path::Path;

use parking_lot::Mutex;

use axe_domain::config::SandboxMode;
use axe_domain::trace::TraceEvent;

pub struct Sandbox {
    use_bwrap: bool,
    pending_warning: Mutex<Option<String>>,
}

impl Sandbox {
    pub fn new(mode: SandboxMode) -> Self {
        let (use_bwrap, pending_warning) = match mode {
            SandboxMode::Namespace => {
                if bwrap_available() {
                    (true, None)
                } else {
                    TraceEvent::SandboxFallback {
                        requested: "namespace".into(),
                        actual: "path_check".into(),
                    }
                    .emit();
                    (
                        false,
                        Some(
                            "sandbox: namespace isolation requested but bwrap is unavailable; \
                             falling back to path_check"
                                .to_owned(),
                        ),
                    )
                }
            }
            SandboxMode::Off | SandboxMode::PathCheck => (false, None),
        };
        Self {
            use_bwrap,
            pending_warning: Mutex::new(pending_warning),
        }
    }

    pub fn use_bwrap(&self) -> bool {
        self.use_bwrap
    }

    /// The one-time fallback warning, if any.  The scheduler appends it
    /// to the transcript on first execution.
    pub fn take_warning(&self) -> Option<String> {
        self.pending_warning.lock().take()
    }

    /// Prefix `argv` with the bubblewrap invocation.
    pub fn wrap(&self, workspace_root: &Path, argv: Vec<String>) -> Vec<String> {
        if !self.use_bwrap {
            return argv;
        }
        let ws = workspace_root.display().to_string();
        let mut wrapped: Vec<String> = vec![
            "bwrap".into(),
            "--ro-bind".into(),
            "/".into(),
            "/".into(),
            "--bind".into(),
            ws.clone(),
            ws.clone(),
            "--dev".into(),
            "/dev".into(),
            "--proc".into(),
            "/proc".into(),
            "--unshare-net".into(),
            "--unshare-pid".into(),
            "--die-with-parent".into(),
            "--chdir".into(),
            ws,
            "--".into(),
        ];
        wrapped.extend(argv);
        wrapped
    }
}

fn bwrap_available() -> bool {
    std::process::Command::new("bwrap")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
