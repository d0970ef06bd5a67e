//! Repository-internal path handling.
//!
//! Callers may hand the filesystem layer paths with or without a leading `/`
//! and with repeated separators. Anything that reaches a provider goes
//! through [`canonicalize_abspath`] first, so stored paths always look like
//! `/a/b/c`, and the root is exactly `/`.

/// Canonicalize a repository path.
///
/// Collapses repeated separators, strips a trailing separator (except for the
/// root itself), and ensures a leading separator. Total and idempotent.
///
/// ```
/// use revfs_types::canonicalize_abspath;
///
/// assert_eq!(canonicalize_abspath("/a//b/"), "/a/b");
/// assert_eq!(canonicalize_abspath("a/b"), "/a/b");
/// assert_eq!(canonicalize_abspath("//"), "/");
/// ```
pub fn canonicalize_abspath(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for component in components(path) {
        out.push('/');
        out.push_str(component);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Non-empty components of a path, in order.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Append one entry name to a canonical directory path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Parent of a canonical path. The parent of `/` is `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Last component of a canonical path; empty for `/`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Returns `true` if `ancestor` is `path` or one of its ancestors.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    relative_to(ancestor, path).is_some()
}

/// The part of `path` below `ancestor`, without a leading separator.
///
/// Returns `Some("")` when the two are equal and `None` when `ancestor` is not
/// an ancestor of `path`.
pub fn relative_to<'a>(ancestor: &str, path: &'a str) -> Option<&'a str> {
    if ancestor == "/" {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(ancestor)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn collapses_and_strips() {
        assert_eq!(canonicalize_abspath("/a//b/"), "/a/b");
        assert_eq!(canonicalize_abspath("///a///b///c"), "/a/b/c");
        assert_eq!(canonicalize_abspath("a"), "/a");
        assert_eq!(canonicalize_abspath("/"), "/");
        assert_eq!(canonicalize_abspath(""), "/");
        assert_eq!(canonicalize_abspath("////"), "/");
    }

    #[test]
    fn canonical_paths_are_unchanged() {
        for p in ["/", "/a", "/a/b", "/trunk/src/main.rs"] {
            assert_eq!(canonicalize_abspath(p), p);
        }
    }

    #[test]
    fn dirname_and_basename() {
        assert_eq!(dirname("/a/b"), "/a");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
        assert_eq!(basename("/a/b"), "b");
        assert_eq!(basename("/a"), "a");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn ancestry() {
        assert!(is_ancestor("/", "/a/b"));
        assert!(is_ancestor("/a", "/a/b"));
        assert!(is_ancestor("/a", "/a"));
        assert!(!is_ancestor("/a", "/ab"));
        assert!(!is_ancestor("/a/b", "/a"));
        assert_eq!(relative_to("/a", "/a/b/c"), Some("b/c"));
        assert_eq!(relative_to("/", "/a"), Some("a"));
        assert_eq!(relative_to("/a", "/a"), Some(""));
        assert_eq!(relative_to("/a", "/b"), None);
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(p in "[a-c/]{0,24}") {
            let once = canonicalize_abspath(&p);
            prop_assert_eq!(canonicalize_abspath(&once), once.clone());
            prop_assert!(once.starts_with('/'));
            prop_assert!(!once.contains("//"));
            prop_assert!(once == "/" || !once.ends_with('/'));
        }

        #[test]
        fn dirname_join_basename_agree(parts in proptest::collection::vec("[a-z]{1,5}", 1..5)) {
            let path = format!("/{}", parts.join("/"));
            prop_assert_eq!(join(dirname(&path), basename(&path)), path.clone());
        }
    }
}
