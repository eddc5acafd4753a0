//! Fenced-block scanning: directive fences (`READ`/`WRITE`/`APPEND`/
//! `EXEC`) and shell fences (`bash`/`sh`/`shell`).
//!
//! Directive tags are case-sensitive.  The argument may follow the tag on
//! the fence line; WRITE/APPEND additionally require a body, READ/EXEC use
//! only the inline argument.  Shell blocks yield one `Exec` per
//! non-comment line, except heredoc-bearing blocks which stay whole.

use axe_domain::operation::Operation;

use crate::sanitize::clean_path;

const FENCE: &str = "```";

/// Scan `text` for fenced blocks, pushing `(byte_offset, op)` hits.
pub(crate) fn scan(text: &str, hits: &mut Vec<(usize, Operation)>) {
    let mut pos = 0;
    while let Some(rel) = text[pos..].find(FENCE) {
        let open = pos + rel;
        // Fences open at the start of a line.
        if open > 0 && text.as_bytes()[open - 1] != b'\n' {
            pos = open + FENCE.len();
            continue;
        }
        match scan_block(text, open, hits) {
            Some(block_end) => pos = block_end,
            None => pos = open + FENCE.len(),
        }
    }
}

/// Parse one block starting at `open`.  Returns the offset just past the
/// closing fence, or `None` when the block is malformed (caller skips the
/// opening fence and carries on).
fn scan_block(text: &str, open: usize, hits: &mut Vec<(usize, Operation)>) -> Option<usize> {
    let after_fence = open + FENCE.len();
    let rest = &text[after_fence..];

    let tag_len = rest
        .find(|c: char| c == ' ' || c == '\t' || c == '\n' || c == '`')
        .unwrap_or(rest.len());
    let tag = &rest[..tag_len];
    if tag.is_empty() {
        return None;
    }

    let line_end = rest.find('\n').unwrap_or(rest.len());
    let header_line = &rest[..line_end];

    // Inline form: the closing fence sits on the tag line.
    if let Some(close_rel) = header_line[tag_len..].find(FENCE) {
        let inline_arg = header_line[tag_len..tag_len + close_rel].trim();
        emit_inline(tag, inline_arg, open, hits);
        return Some(after_fence + tag_len + close_rel + FENCE.len());
    }

    // Block form: body runs from after the header line to the line that
    // starts the closing fence.
    if line_end == rest.len() {
        return None; // header never terminated
    }
    let body_start = line_end + 1;
    let close_rel = rest[body_start..].find(&format!("\n{FENCE}"))
        .map(|i| body_start + i + 1)
        .or_else(|| rest[body_start..].starts_with(FENCE).then_some(body_start))?;
    let body = &rest[body_start..close_rel];
    let header_arg = header_line[tag_len..].trim();

    match tag {
        "READ" => push_path_op(hits, open, header_arg, |p| Operation::Read { path: p }),
        "EXEC" => {
            if !header_arg.is_empty() {
                hits.push((
                    open,
                    Operation::Exec {
                        command: header_arg.to_owned(),
                    },
                ));
            }
        }
        "WRITE" => push_content_op(hits, open, header_arg, body, |p, c| Operation::Write {
            path: p,
            content: c,
        }),
        "APPEND" => push_content_op(hits, open, header_arg, body, |p, c| Operation::Append {
            path: p,
            content: c,
        }),
        "bash" | "sh" | "shell" => emit_shell_body(body, after_fence + body_start, hits),
        _ => {}
    }

    Some(after_fence + close_rel + FENCE.len())
}

fn emit_inline(tag: &str, arg: &str, offset: usize, hits: &mut Vec<(usize, Operation)>) {
    if arg.is_empty() {
        return;
    }
    match tag {
        "READ" => push_path_op(hits, offset, arg, |p| Operation::Read { path: p }),
        "EXEC" | "bash" | "sh" | "shell" => hits.push((
            offset,
            Operation::Exec {
                command: arg.to_owned(),
            },
        )),
        // WRITE/APPEND require a body; the inline form cannot carry one.
        _ => {}
    }
}

fn push_path_op(
    hits: &mut Vec<(usize, Operation)>,
    offset: usize,
    raw: &str,
    make: impl FnOnce(String) -> Operation,
) {
    let path = clean_path(raw);
    if !path.is_empty() {
        hits.push((offset, make(path)));
    }
}

fn push_content_op(
    hits: &mut Vec<(usize, Operation)>,
    offset: usize,
    raw_path: &str,
    body: &str,
    make: impl FnOnce(String, String) -> Operation,
) {
    let path = clean_path(raw_path);
    if path.is_empty() || body.is_empty() {
        return;
    }
    hits.push((offset, make(path, body.to_owned())));
}

/// One `Exec` per non-comment line, or a single whole-block `Exec` when a
/// heredoc is present (splitting would sever the body from its command).
fn emit_shell_body(body: &str, body_offset: usize, hits: &mut Vec<(usize, Operation)>) {
    if contains_heredoc(body) {
        let command = body.trim_end_matches('\n');
        if !command.trim().is_empty() {
            hits.push((
                body_offset,
                Operation::Exec {
                    command: command.to_owned(),
                },
            ));
        }
        return;
    }

    let mut offset = body_offset;
    for line in body.split_inclusive('\n') {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            hits.push((
                offset,
                Operation::Exec {
                    command: trimmed.to_owned(),
                },
            ));
        }
        offset += line.len();
    }
}

/// Heredoc (`<< LABEL`, `<<- LABEL`) or here-string (`<<<`) marker.
pub(crate) fn contains_heredoc(s: &str) -> bool {
    let bytes = s.as_bytes();
    for (i, window) in bytes.windows(2).enumerate() {
        if window == b"<<" {
            // Not the tail of a here-string already counted.
            if i > 0 && bytes[i - 1] == b'<' {
                continue;
            }
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(text: &str) -> Vec<Operation> {
        let mut hits = Vec::new();
        scan(text, &mut hits);
        hits.sort_by_key(|(off, _)| *off);
        hits.into_iter().map(|(_, op)| op).collect()
    }

    #[test]
    fn inline_read_directive() {
        let got = ops("```READ notes.md```");
        assert_eq!(
            got,
            vec![Operation::Read {
                path: "notes.md".into()
            }]
        );
    }

    #[test]
    fn block_read_uses_inline_argument_only() {
        let got = ops("```READ notes.md\nthis body is ignored\n```");
        assert_eq!(
            got,
            vec![Operation::Read {
                path: "notes.md".into()
            }]
        );
    }

    #[test]
    fn write_requires_body() {
        let got = ops("```WRITE out.txt\nline one\nline two\n```");
        assert_eq!(
            got,
            vec![Operation::Write {
                path: "out.txt".into(),
                content: "line one\nline two\n".into()
            }]
        );
        // No body → dropped.
        assert!(ops("```WRITE out.txt```").is_empty());
    }

    #[test]
    fn append_directive_block() {
        let got = ops("```APPEND log.txt\nnew line\n```");
        assert_eq!(
            got,
            vec![Operation::Append {
                path: "log.txt".into(),
                content: "new line\n".into()
            }]
        );
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert!(ops("```read notes.md```").is_empty());
        assert!(ops("```Exec ls```").is_empty());
    }

    #[test]
    fn shell_block_one_exec_per_line() {
        let got = ops("```bash\nls -la\n# a comment\n\ncargo test\n```");
        assert_eq!(
            got,
            vec![
                Operation::Exec {
                    command: "ls -la".into()
                },
                Operation::Exec {
                    command: "cargo test".into()
                },
            ]
        );
    }

    #[test]
    fn comments_only_block_yields_nothing() {
        assert!(ops("```bash\n# just a note\n# another\n```").is_empty());
    }

    #[test]
    fn heredoc_block_stays_whole() {
        let text = "```bash\ncat > out.md << 'EOF'\n# Title\n- a\nEOF\n```";
        let got = ops(text);
        assert_eq!(
            got,
            vec![Operation::Exec {
                command: "cat > out.md << 'EOF'\n# Title\n- a\nEOF".into()
            }]
        );
    }

    #[test]
    fn here_string_block_stays_whole() {
        let got = ops("```sh\ngrep foo <<< \"foo bar\"\n```");
        assert_eq!(got.len(), 1);
        assert!(matches!(&got[0], Operation::Exec { command } if command.contains("<<<")));
    }

    #[test]
    fn inline_shell_fence() {
        let got = ops("```bash ls -la```");
        assert_eq!(
            got,
            vec![Operation::Exec {
                command: "ls -la".into()
            }]
        );
    }

    #[test]
    fn unterminated_block_is_dropped() {
        assert!(ops("```bash\nls -la").is_empty());
    }

    #[test]
    fn unrelated_language_fences_are_ignored() {
        assert!(ops("```rust\nfn main() {}\n```").is_empty());
    }

    #[test]
    fn mid_line_fence_is_not_a_block() {
        assert!(ops("see ```bash ls``` for details").is_empty());
    }

    #[test]
    fn heredoc_detection() {
        assert!(contains_heredoc("cat << EOF"));
        assert!(contains_heredoc("cat <<- EOF"));
        assert!(contains_heredoc("cat <<< \"x\""));
        assert!(!contains_heredoc("ls -la | grep x"));
    }
}
