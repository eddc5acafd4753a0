//! Inline tag forms: `<bash>`, `<shell>`, `<read_file>`, and
//! `<write_file path="…">`.

use regex::Regex;
use std::sync::OnceLock;

use axe_domain::operation::Operation;

use crate::sanitize::clean_path;

fn bash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<bash>(.*?)</bash>").expect("static regex"))
}

fn shell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<shell>(.*?)</shell>").expect("static regex"))
}

fn read_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<read_file>(.*?)</read_file>").expect("static regex"))
}

fn write_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<write_file\s+path\s*=\s*"([^"]*)"\s*>(.*?)</write_file>"#)
            .expect("static regex")
    })
}

/// Scan `text` for tag-form operations, pushing `(byte_offset, op)` hits.
pub(crate) fn scan(text: &str, hits: &mut Vec<(usize, Operation)>) {
    for caps in bash_re().captures_iter(text).chain(shell_re().captures_iter(text)) {
        let m = caps.get(0).expect("full match");
        let command = caps[1].trim();
        if !command.is_empty() {
            hits.push((
                m.start(),
                Operation::Exec {
                    command: command.to_owned(),
                },
            ));
        }
    }

    for caps in read_re().captures_iter(text) {
        let m = caps.get(0).expect("full match");
        let path = clean_path(&caps[1]);
        if !path.is_empty() {
            hits.push((m.start(), Operation::Read { path }));
        }
    }

    for caps in write_re().captures_iter(text) {
        let m = caps.get(0).expect("full match");
        let path = clean_path(&caps[1]);
        if !path.is_empty() {
            hits.push((
                m.start(),
                Operation::Write {
                    path,
                    content: caps[2].to_owned(),
                },
            ));
        }
    }
}
