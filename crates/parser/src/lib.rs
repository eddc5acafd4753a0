//! The tool-call parser: decodes an agent's free-text reply into an
//! ordered, deduplicated list of executable operations.
//!
//! Five surface forms are recognized in one pass — directive fences,
//! shell fences, inline `<bash>` tags, simple named tags, and structured
//! invocation envelopes — and treated as equivalent.  A reply that
//! restates the same call in two syntactic forms yields it exactly once.
//!
//! The parser never fails: malformed fragments are dropped silently and
//! an unrecognizable reply produces an empty list.  Policy is not applied
//! here — traversal attempts and forbidden paths pass through verbatim
//! for the runner to reject.

mod envelope;
mod fence;
mod tags;

pub mod sanitize;

use std::collections::HashSet;

use axe_domain::operation::Operation;

/// Extract all operations from one reply, in order of first appearance,
/// with exact duplicates (same kind, same arguments, any surface form)
/// collapsed to the first occurrence.
pub fn parse_reply(text: &str) -> Vec<Operation> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<(usize, Operation)> = Vec::new();
    fence::scan(text, &mut hits);
    tags::scan(text, &mut hits);
    envelope::scan(text, &mut hits);

    // Stable sort keeps scanner emission order for equal offsets.
    hits.sort_by_key(|(offset, _)| *offset);

    let mut seen: HashSet<String> = HashSet::new();
    let mut ops = Vec::with_capacity(hits.len());
    for (_, op) in hits {
        if seen.insert(op.fingerprint()) {
            ops.push(op);
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reply_yields_no_operations() {
        assert!(parse_reply("").is_empty());
        assert!(parse_reply("Sure, let me think about that.").is_empty());
    }

    #[test]
    fn comments_only_shell_block_yields_nothing() {
        assert!(parse_reply("```bash\n# nothing to do yet\n```").is_empty());
    }

    #[test]
    fn same_call_in_two_forms_executes_once() {
        let reply = "I'll list the files:\n\
                     <bash>ls -la</bash>\n\
                     ```bash\nls -la\n```\n";
        let ops = parse_reply(reply);
        assert_eq!(
            ops,
            vec![Operation::Exec {
                command: "ls -la".into()
            }]
        );
    }

    #[test]
    fn same_call_in_three_forms_executes_once() {
        let reply = "<bash>ls -la</bash>\n\
                     ```bash\nls -la\n```\n\
                     <function_calls><invoke name=\"bash\">\
                     <parameter name=\"command\">ls -la</parameter>\
                     </invoke></function_calls>";
        assert_eq!(parse_reply(reply).len(), 1);
    }

    #[test]
    fn distinct_calls_are_all_kept_in_order() {
        let reply = "```READ a.md```\n\
                     <bash>ls</bash>\n\
                     ```READ b.md```\n";
        let ops = parse_reply(reply);
        assert_eq!(
            ops,
            vec![
                Operation::Read { path: "a.md".into() },
                Operation::Exec { command: "ls".into() },
                Operation::Read { path: "b.md".into() },
            ]
        );
    }

    #[test]
    fn order_follows_first_appearance_across_forms() {
        let reply = "<function_calls><invoke name=\"read\">\
                     <parameter name=\"path\">z.md</parameter>\
                     </invoke></function_calls>\n\
                     ```bash\npwd\n```\n";
        let ops = parse_reply(reply);
        assert!(matches!(ops[0], Operation::Read { .. }));
        assert!(matches!(ops[1], Operation::Exec { .. }));
    }

    #[test]
    fn duplicate_read_across_fence_and_tag_forms() {
        let reply = "```READ notes.md```\n<read_file>notes.md</read_file>";
        assert_eq!(
            parse_reply(reply),
            vec![Operation::Read {
                path: "notes.md".into()
            }]
        );
    }

    #[test]
    fn near_duplicates_are_not_merged() {
        let reply = "<bash>ls</bash><bash>ls -la</bash>";
        assert_eq!(parse_reply(reply).len(), 2);
    }

    #[test]
    fn traversal_paths_survive_parsing() {
        let ops = parse_reply("```READ ../../etc/passwd```");
        assert_eq!(
            ops,
            vec![Operation::Read {
                path: "../../etc/passwd".into()
            }]
        );
    }

    #[test]
    fn malformed_soup_never_panics() {
        let garbage = "``` \n<bash>\n``` <invoke name=\"\n<write_file path=\"x\n``` ```READ```";
        let _ = parse_reply(garbage);
        let _ = parse_reply("```");
        let _ = parse_reply("<function_calls>");
        let _ = parse_reply("``````");
    }

    /// Round trip: canonically serialized operations re-parse to the same
    /// list.
    #[test]
    fn serialize_then_parse_round_trip() {
        let original = vec![
            Operation::Read { path: "a.md".into() },
            Operation::Exec { command: "ls -la".into() },
            Operation::Write {
                path: "out/b.txt".into(),
                content: "body\n".into(),
            },
        ];
        let mut reply = String::new();
        for op in &original {
            match op {
                Operation::Read { path } => reply.push_str(&format!("```READ {path}```\n")),
                Operation::Exec { command } => {
                    reply.push_str(&format!("```bash\n{command}\n```\n"))
                }
                Operation::Write { path, content } => {
                    reply.push_str(&format!("```WRITE {path}\n{content}```\n"))
                }
                _ => unreachable!(),
            }
        }
        assert_eq!(parse_reply(&reply), original);
    }
}
