//! Structured invocation envelopes:
//! `<function_calls><invoke name="T">…<parameter name="K">V</parameter>…`.
//!
//! Tool and parameter names go through fixed synonym tables; anything the
//! tables do not know is ignored so a creative tool name never derails
//! the session.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use axe_domain::operation::Operation;

use crate::sanitize::clean_path;

fn envelope_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<function_calls>(.*?)</function_calls>").expect("static regex")
    })
}

fn invoke_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<invoke\s+name\s*=\s*"([^"]*)"\s*>(.*?)</invoke>"#)
            .expect("static regex")
    })
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<parameter\s+name\s*=\s*"([^"]*)"\s*>(.*?)</parameter>"#)
            .expect("static regex")
    })
}

/// Canonical tool groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolGroup {
    Read,
    Write,
    Append,
    Exec,
    ListDir,
}

fn tool_group(name: &str) -> Option<ToolGroup> {
    match name {
        "read_file" | "read" | "cat" | "get_file" | "view_file" => Some(ToolGroup::Read),
        "write_file" | "write" | "create_file" | "save_file" => Some(ToolGroup::Write),
        "append_file" | "append" | "append_to_file" => Some(ToolGroup::Append),
        "shell" | "bash" | "exec" | "run_shell" | "execute" | "run_command" => {
            Some(ToolGroup::Exec)
        }
        "list_dir" | "list_directory" | "ls" | "listdir" => Some(ToolGroup::ListDir),
        _ => None,
    }
}

const PATH_SYNONYMS: &[&str] = &["file_path", "path", "filename", "file"];
const CONTENT_SYNONYMS: &[&str] = &["content", "data", "text", "contents"];
const COMMAND_SYNONYMS: &[&str] = &["command", "cmd", "shell_command"];
const DIRECTORY_SYNONYMS: &[&str] = &["path", "directory", "dir"];

fn lookup<'a>(params: &'a HashMap<String, String>, synonyms: &[&str]) -> Option<&'a str> {
    synonyms
        .iter()
        .find_map(|k| params.get(*k).map(String::as_str))
}

/// Scan `text` for invocation envelopes, pushing `(byte_offset, op)` hits.
pub(crate) fn scan(text: &str, hits: &mut Vec<(usize, Operation)>) {
    for env in envelope_re().captures_iter(text) {
        let env_match = env.get(1).expect("envelope body");
        let body = env_match.as_str();
        let base = env_match.start();

        for caps in invoke_re().captures_iter(body) {
            let m = caps.get(0).expect("full match");
            let Some(group) = tool_group(&caps[1]) else {
                tracing::debug!(tool = &caps[1], "ignoring unknown tool in invocation envelope");
                continue;
            };

            let mut params: HashMap<String, String> = HashMap::new();
            for p in param_re().captures_iter(&caps[2]) {
                params.insert(p[1].to_owned(), p[2].to_owned());
            }

            let offset = base + m.start();
            let op = match group {
                ToolGroup::Read => lookup(&params, PATH_SYNONYMS).and_then(|p| {
                    let path = clean_path(p);
                    (!path.is_empty()).then_some(Operation::Read { path })
                }),
                ToolGroup::Write => make_content_op(&params, |path, content| Operation::Write {
                    path,
                    content,
                }),
                ToolGroup::Append => make_content_op(&params, |path, content| Operation::Append {
                    path,
                    content,
                }),
                ToolGroup::Exec => lookup(&params, COMMAND_SYNONYMS).and_then(|c| {
                    let command = c.trim().to_owned();
                    (!command.is_empty()).then_some(Operation::Exec { command })
                }),
                ToolGroup::ListDir => lookup(&params, DIRECTORY_SYNONYMS).and_then(|p| {
                    let path = clean_path(p);
                    (!path.is_empty()).then_some(Operation::ListDir { path })
                }),
            };
            if let Some(op) = op {
                hits.push((offset, op));
            }
        }
    }
}

fn make_content_op(
    params: &HashMap<String, String>,
    make: impl FnOnce(String, String) -> Operation,
) -> Option<Operation> {
    let path = clean_path(lookup(params, PATH_SYNONYMS)?);
    let content = lookup(params, CONTENT_SYNONYMS)?.to_owned();
    (!path.is_empty()).then(|| make(path, content))
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
    fn read_via_synonyms() {
        for tool in ["read_file", "cat", "view_file"] {
            for param in ["file_path", "path", "filename", "file"] {
                let text = format!(
                    "<function_calls><invoke name=\"{tool}\">\
                     <parameter name=\"{param}\">notes.md</parameter>\
                     </invoke></function_calls>"
                );
                assert_eq!(
                    ops(&text),
                    vec![Operation::Read {
                        path: "notes.md".into()
                    }],
                    "{tool}/{param}"
                );
            }
        }
    }

    #[test]
    fn exec_via_synonyms() {
        let text = "<function_calls><invoke name=\"run_command\">\
                    <parameter name=\"cmd\">cargo test</parameter>\
                    </invoke></function_calls>";
        assert_eq!(
            ops(text),
            vec![Operation::Exec {
                command: "cargo test".into()
            }]
        );
    }

    #[test]
    fn write_requires_both_params() {
        let text = "<function_calls><invoke name=\"create_file\">\
                    <parameter name=\"path\">a.txt</parameter>\
                    <parameter name=\"data\">hello</parameter>\
                    </invoke></function_calls>";
        assert_eq!(
            ops(text),
            vec![Operation::Write {
                path: "a.txt".into(),
                content: "hello".into()
            }]
        );

        let missing = "<function_calls><invoke name=\"create_file\">\
                       <parameter name=\"path\">a.txt</parameter>\
                       </invoke></function_calls>";
        assert!(ops(missing).is_empty());
    }

    #[test]
    fn list_dir_accepts_directory_synonyms() {
        let text = "<function_calls><invoke name=\"list_directory\">\
                    <parameter name=\"dir\">src</parameter>\
                    </invoke></function_calls>";
        assert_eq!(
            ops(text),
            vec![Operation::ListDir { path: "src".into() }]
        );
    }

    #[test]
    fn unknown_tool_is_ignored_without_error() {
        let text = "<function_calls><invoke name=\"summon_demon\">\
                    <parameter name=\"path\">pentagram</parameter>\
                    </invoke><invoke name=\"ls\">\
                    <parameter name=\"path\">.</parameter>\
                    </invoke></function_calls>";
        assert_eq!(ops(text), vec![Operation::ListDir { path: ".".into() }]);
    }

    #[test]
    fn multiple_invokes_keep_order() {
        let text = "<function_calls>\
                    <invoke name=\"read\"><parameter name=\"path\">a</parameter></invoke>\
                    <invoke name=\"bash\"><parameter name=\"command\">ls</parameter></invoke>\
                    </function_calls>";
        let got = ops(text);
        assert_eq!(got.len(), 2);
        assert!(matches!(got[0], Operation::Read { .. }));
        assert!(matches!(got[1], Operation::Exec { .. }));
    }
}
