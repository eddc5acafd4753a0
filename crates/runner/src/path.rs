//! Workspace path containment.
//!
//! Every file operation resolves its path here first.  Absolute paths are
//! accepted only when their canonical form is the workspace root or sits
//! strictly under it; relative paths are joined onto the root.  Symlinks
//! are resolved before the containment check, so a link pointing outside
//! the workspace is caught.

use std::path::{Path, PathBuf};

use axe_domain::config::ToolPolicy;

pub const DENY_OUTSIDE: &str = "path_outside_workspace";
pub const DENY_FORBIDDEN: &str = "forbidden_path";
pub const DENY_NOT_WRITABLE: &str = "path_not_writable";

/// Resolve `requested` against the (already canonical) workspace root and
/// apply the policy's path rules.  Returns the canonical absolute path or
/// the denial reason.
pub fn resolve(
    workspace_root: &Path,
    requested: &str,
    policy: &ToolPolicy,
) -> Result<PathBuf, &'static str> {
    let requested_path = Path::new(requested);
    let candidate = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        workspace_root.join(requested_path)
    };

    let resolved = canonicalize_allowing_new(&candidate).ok_or(DENY_OUTSIDE)?;

    // Containment: the root itself or a separator-aligned descendant.
    if resolved != workspace_root && !resolved.starts_with(workspace_root) {
        return Err(DENY_OUTSIDE);
    }

    for prefix in &policy.forbidden_paths {
        if resolved.starts_with(prefix) {
            return Err(DENY_FORBIDDEN);
        }
    }

    Ok(resolved)
}

/// Additional constraint for writes: when `writable_paths` is non-empty
/// the resolved path must fall under one of its prefixes (relative
/// entries are anchored at the workspace root).
pub fn check_writable(
    workspace_root: &Path,
    resolved: &Path,
    policy: &ToolPolicy,
) -> Result<(), &'static str> {
    if policy.writable_paths.is_empty() {
        return Ok(());
    }
    for prefix in &policy.writable_paths {
        let anchored = if prefix.is_absolute() {
            prefix.clone()
        } else {
            workspace_root.join(prefix)
        };
        if resolved.starts_with(&anchored) {
            return Ok(());
        }
    }
    Err(DENY_NOT_WRITABLE)
}

/// Canonicalize a path that may not exist yet: walk up to the nearest
/// existing ancestor, canonicalize that (resolving symlinks), then append
/// the remaining components.  `..` in the non-existing tail escapes
/// nothing because it is re-joined onto the canonical ancestor lexically —
/// normalize it away first.
fn canonicalize_allowing_new(candidate: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = candidate.canonicalize() {
        return Some(resolved);
    }

    let mut existing = candidate;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        let file_name = existing.file_name()?;
        tail.push(file_name);
        existing = existing.parent()?;
    }

    // A `..` component in the new tail would lexically cancel canonical
    // ancestors; resolve it before re-joining.
    let mut resolved = existing.canonicalize().ok()?;
    for part in tail.into_iter().rev() {
        if part == ".." {
            resolved = resolved.parent()?.to_path_buf();
        } else if part != "." {
            resolved.push(part);
        }
    }
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ws() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    #[test]
    fn relative_path_resolves_under_root() {
        let (_d, root) = ws();
        let policy = ToolPolicy::default();
        let p = resolve(&root, "notes.md", &policy).unwrap();
        assert_eq!(p, root.join("notes.md"));
    }

    #[test]
    fn absolute_path_inside_workspace_is_accepted() {
        let (_d, root) = ws();
        std::fs::write(root.join("f.txt"), "x").unwrap();
        let policy = ToolPolicy::default();
        let p = resolve(&root, root.join("f.txt").to_str().unwrap(), &policy).unwrap();
        assert_eq!(p, root.join("f.txt"));
        // The root itself is also fine.
        assert_eq!(resolve(&root, root.to_str().unwrap(), &policy).unwrap(), root);
    }

    #[test]
    fn absolute_path_outside_workspace_is_denied() {
        let (_d, root) = ws();
        let policy = ToolPolicy::default();
        assert_eq!(
            resolve(&root, "/etc/passwd", &policy).unwrap_err(),
            DENY_OUTSIDE
        );
    }

    #[test]
    fn parent_traversal_is_denied() {
        let (_d, root) = ws();
        let policy = ToolPolicy::default();
        assert_eq!(
            resolve(&root, "../outside.txt", &policy).unwrap_err(),
            DENY_OUTSIDE
        );
        assert_eq!(
            resolve(&root, "sub/../../outside.txt", &policy).unwrap_err(),
            DENY_OUTSIDE
        );
    }

    #[test]
    fn traversal_that_stays_inside_is_fine() {
        let (_d, root) = ws();
        std::fs::create_dir(root.join("sub")).unwrap();
        let policy = ToolPolicy::default();
        let p = resolve(&root, "sub/../notes.md", &policy).unwrap();
        assert_eq!(p, root.join("notes.md"));
    }

    #[test]
    fn prefix_match_is_separator_aligned() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap().join("work");
        std::fs::create_dir(&root).unwrap();
        let sibling = root.parent().unwrap().join("workspace-evil");
        std::fs::create_dir(&sibling).unwrap();
        let policy = ToolPolicy::default();
        assert_eq!(
            resolve(&root, sibling.join("f").to_str().unwrap(), &policy).unwrap_err(),
            DENY_OUTSIDE
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_workspace_is_denied() {
        let (_d, root) = ws();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();
        let policy = ToolPolicy::default();
        assert_eq!(
            resolve(&root, "link/secret.txt", &policy).unwrap_err(),
            DENY_OUTSIDE
        );
    }

    #[test]
    fn forbidden_prefix_inside_workspace() {
        let (_d, root) = ws();
        let mut policy = ToolPolicy::default();
        policy.forbidden_paths.push(root.join("secrets"));
        std::fs::create_dir(root.join("secrets")).unwrap();
        assert_eq!(
            resolve(&root, "secrets/key.pem", &policy).unwrap_err(),
            DENY_FORBIDDEN
        );
    }

    #[test]
    fn writable_paths_restrict_writes() {
        let (_d, root) = ws();
        let mut policy = ToolPolicy::default();
        policy.writable_paths.push(PathBuf::from("out"));

        let ok = resolve(&root, "out/gen.txt", &policy).unwrap();
        assert!(check_writable(&root, &ok, &policy).is_ok());

        let nope = resolve(&root, "src/gen.txt", &policy).unwrap();
        assert_eq!(
            check_writable(&root, &nope, &policy).unwrap_err(),
            DENY_NOT_WRITABLE
        );

        // Empty writable list = whole workspace writable.
        let open = ToolPolicy::default();
        assert!(check_writable(&root, &nope, &open).is_ok());
    }
}
