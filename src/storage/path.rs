//! Traversal-safe path resolution
//!
//! Caller-supplied references go through two stages before touching the
//! filesystem:
//!
//! 1. [`strip_parent_tokens`] removes every literal `..` from the string, not
//!    only whole segments, and trims leading separators so the result is
//!    always relative.
//! 2. [`resolve_within`] joins the result under the root, canonicalizes it and
//!    rejects anything whose canonical form is not below the canonical root.
//!    This catches symlinks pointing outside the root.

use std::io;
use std::path::{Path, PathBuf};

const PARENT_TOKEN: &str = "..";

/// Remove every occurrence of `..` and any leading `/` or `\`
///
/// `../../etc/passwd` becomes `etc/passwd`, `a/../b` becomes `a//b`.
pub fn strip_parent_tokens(reference: &str) -> String {
    // A single pass suffices: an odd run of dots leaves one dot behind.
    reference
        .replace(PARENT_TOKEN, "")
        .trim_start_matches(['/', '\\'])
        .to_string()
}

/// Join a sanitized reference under `root` without touching the filesystem
pub fn join_under(root: &Path, reference: &str) -> PathBuf {
    root.join(strip_parent_tokens(reference))
}

/// Resolve `reference` under `root` and verify containment.
///
/// Returns the canonical path of an existing entry inside `root`, or an
/// `io::ErrorKind::NotFound` error when the entry is missing or escapes the
/// root. Both cases are indistinguishable to the caller.
pub async fn resolve_within(root: &Path, reference: &str) -> io::Result<PathBuf> {
    let canonical_root = tokio::fs::canonicalize(root).await?;
    let candidate = canonical_root.join(strip_parent_tokens(reference));
    let resolved = tokio::fs::canonicalize(&candidate).await?;

    if !resolved.starts_with(&canonical_root) {
        tracing::warn!(
            root = %canonical_root.display(),
            resolved = %resolved.display(),
            "Rejected reference resolving outside storage root"
        );
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "reference resolves outside storage root",
        ));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_traversal_prefix() {
        assert_eq!(strip_parent_tokens("../../etc/passwd"), "etc/passwd");
    }

    #[test]
    fn test_strip_inside_segments() {
        assert_eq!(strip_parent_tokens("a/..b/c"), "a/b/c");
        assert_eq!(strip_parent_tokens("a/../b"), "a//b");
        assert_eq!(strip_parent_tokens("...."), "");
        assert_eq!(strip_parent_tokens("...x"), ".x");
    }

    #[test]
    fn test_strip_removes_leading_separators() {
        assert_eq!(strip_parent_tokens("/etc/passwd"), "etc/passwd");
        assert_eq!(strip_parent_tokens("\\\\server"), "server");
    }

    #[test]
    fn test_plain_reference_unchanged() {
        assert_eq!(strip_parent_tokens("1700000000/a.txt"), "1700000000/a.txt");
    }

    #[test]
    fn test_join_under_stays_below_root() {
        let root = Path::new("/srv/base");
        assert_eq!(
            join_under(root, "/../etc/passwd"),
            PathBuf::from("/srv/base/etc/passwd")
        );
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("123")).unwrap();
        std::fs::write(dir.path().join("123/a.txt"), b"hi").unwrap();

        let resolved = resolve_within(dir.path(), "123/a.txt").await.unwrap();
        assert!(resolved.ends_with("123/a.txt"));
    }

    #[tokio::test]
    async fn test_resolve_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_within(dir.path(), "nope.txt").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let err = resolve_within(root.path(), "link/secret.txt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
