//! Control tokens embedded in agent replies.
//!
//! Exact-literal, case-sensitive forms:
//! `[[SLEEP: <minutes>, <reason>]]`, `[[BREAK: <minutes>, <reason>]]`,
//! `[[EMERGENCY]]…[[/EMERGENCY]]`, `[[GITHUB_READY: <branch>, <message>]]`,
//! and `[[TASK_COMPLETE]]`.  Anything less exact — lowercase, prose
//! mentioning completion — is inert, which is what keeps false positives
//! out of session termination.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    SleepRequest { minutes: u64, reason: String },
    BreakRequest { minutes: u64, reason: String },
    Emergency { payload: String },
    GithubReady { branch: String, message: String },
    TaskComplete,
}

fn sleep_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[SLEEP: (\d+), ([^\]]*)\]\]").expect("static regex"))
}

fn break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[BREAK: (\d+), ([^\]]*)\]\]").expect("static regex"))
}

fn emergency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\[\[EMERGENCY\]\](.*?)\[\[/EMERGENCY\]\]").expect("static regex")
    })
}

fn github_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[GITHUB_READY: ([^,\]]+), ([^\]]*)\]\]").expect("static regex")
    })
}

/// Scan one reply for control signals, in order of appearance.
pub fn scan(reply: &str) -> Vec<ControlSignal> {
    let mut found: Vec<(usize, ControlSignal)> = Vec::new();

    for caps in sleep_re().captures_iter(reply) {
        if let Ok(minutes) = caps[1].parse() {
            found.push((
                caps.get(0).expect("match").start(),
                ControlSignal::SleepRequest {
                    minutes,
                    reason: caps[2].trim().to_owned(),
                },
            ));
        }
    }
    for caps in break_re().captures_iter(reply) {
        if let Ok(minutes) = caps[1].parse() {
            found.push((
                caps.get(0).expect("match").start(),
                ControlSignal::BreakRequest {
                    minutes,
                    reason: caps[2].trim().to_owned(),
                },
            ));
        }
    }
    for caps in emergency_re().captures_iter(reply) {
        found.push((
            caps.get(0).expect("match").start(),
            ControlSignal::Emergency {
                payload: caps[1].to_owned(),
            },
        ));
    }
    for caps in github_re().captures_iter(reply) {
        found.push((
            caps.get(0).expect("match").start(),
            ControlSignal::GithubReady {
                branch: caps[1].trim().to_owned(),
                message: caps[2].trim().to_owned(),
            },
        ));
    }
    for (pos, _) in reply.match_indices("[[TASK_COMPLETE]]") {
        found.push((pos, ControlSignal::TaskComplete));
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_and_break_requests() {
        let signals = scan("done for now [[SLEEP: 20, tired]] and [[BREAK: 10, coffee]]");
        assert_eq!(
            signals,
            vec![
                ControlSignal::SleepRequest {
                    minutes: 20,
                    reason: "tired".into()
                },
                ControlSignal::BreakRequest {
                    minutes: 10,
                    reason: "coffee".into()
                },
            ]
        );
    }

    #[test]
    fn emergency_payload_spans_lines() {
        let signals = scan("[[EMERGENCY]]\nthe supervisor is stuck\nin a loop\n[[/EMERGENCY]]");
        assert_eq!(signals.len(), 1);
        let ControlSignal::Emergency { payload } = &signals[0] else {
            panic!("expected emergency");
        };
        assert!(payload.contains("stuck"));
    }

    #[test]
    fn github_ready_splits_branch_and_message() {
        let signals = scan("[[GITHUB_READY: axe/fix-parser, fix heredoc handling]]");
        assert_eq!(
            signals,
            vec![ControlSignal::GithubReady {
                branch: "axe/fix-parser".into(),
                message: "fix heredoc handling".into()
            }]
        );
    }

    #[test]
    fn task_complete_is_exact_literal_only() {
        assert_eq!(scan("[[TASK_COMPLETE]]"), vec![ControlSignal::TaskComplete]);
        // Mere prose never counts.
        assert!(scan("I think the task is complete now.").is_empty());
        assert!(scan("[[task_complete]]").is_empty());
        assert!(scan("[[TASK_COMPLETE ]]").is_empty());
    }

    #[test]
    fn signals_keep_reply_order() {
        let signals = scan("[[TASK_COMPLETE]] then [[SLEEP: 5, nap]]");
        assert!(matches!(signals[0], ControlSignal::TaskComplete));
        assert!(matches!(signals[1], ControlSignal::SleepRequest { .. }));
    }

    #[test]
    fn malformed_tokens_are_ignored() {
        assert!(scan("[[SLEEP: lots, reason]]").is_empty());
        assert!(scan("[[GITHUB_READY: only-branch]]").is_empty());
        assert!(scan("[[EMERGENCY]] unterminated").is_empty());
    }
}
