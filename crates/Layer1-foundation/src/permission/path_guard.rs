//! Path confinement - keeps client-supplied paths inside a fixed root
//!
//! Client paths are always relative and always use `/` or `\` as separators,
//! whatever the host OS. Every file-manager operation goes through
//! [`PathGuard::resolve`] before touching the filesystem.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolve `relative` against `base`, refusing anything that could leave it.
///
/// - `\` and `/` are treated the same
/// - absolute paths, drive prefixes and NUL bytes are refused
/// - any `..` segment is refused, wherever it appears
/// - the deepest existing ancestor of the result is canonicalized and must
///   stay under the canonical `base`, so symlinks cannot be used to escape
pub fn resolve(base: &Path, relative: &str) -> Result<PathBuf> {
    let normalized = relative.replace('\\', "/");

    if normalized.contains('\0') || normalized.starts_with('/') {
        return Err(escape(relative));
    }

    let mut resolved = base.to_path_buf();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(escape(relative)),
            s if has_drive_prefix(s) => return Err(escape(relative)),
            s => resolved.push(s),
        }
    }

    ensure_within(base, &resolved, relative)?;
    Ok(resolved)
}

/// Validate a single new entry name (folder, rename target, upload)
pub fn resolve_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
        || has_drive_prefix(trimmed)
    {
        return Err(escape(name));
    }
    Ok(trimmed)
}

/// Client-facing form of a resolved path: relative to `base`, `/`-separated.
/// `base` itself renders as the empty string.
pub fn relative_display(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(Path::new(""));
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `C:` / `c:foo` style prefixes, refused on every platform
fn has_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn escape(input: &str) -> Error {
    debug!(path = input, "Path rejected by confinement guard");
    Error::PathEscape(input.to_string())
}

fn ensure_within(base: &Path, candidate: &Path, original: &str) -> Result<()> {
    let canonical_base = base
        .canonicalize()
        .map_err(|e| Error::Config(format!("Root {} is not usable: {}", base.display(), e)))?;

    // `symlink_metadata` sees a dangling link as present; canonicalizing it
    // then fails and the path is refused instead of written through
    let mut cursor = Some(candidate);
    while let Some(path) = cursor {
        if std::fs::symlink_metadata(path).is_ok() {
            let canonical = path.canonicalize().map_err(|_| escape(original))?;
            if canonical.starts_with(&canonical_base) {
                return Ok(());
            }
            return Err(escape(original));
        }
        cursor = path.parent();
    }

    Err(escape(original))
}

/// Confinement root plus the operations the file manager needs
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`. The root must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| Error::Config(format!("Root {} is not usable: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// See [`resolve`]
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        resolve(&self.root, relative)
    }

    /// Resolve `name` as a direct child of the already-resolved `dir`
    pub fn resolve_child(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let name = resolve_name(name)?;
        let child = dir.join(name);
        ensure_within(&self.root, &child, name)?;
        Ok(child)
    }

    /// See [`relative_display`]
    pub fn display(&self, path: &Path) -> String {
        relative_display(&self.root, path)
    }

    /// True when `path` is the root itself
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard() -> (TempDir, PathGuard) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        std::fs::write(dir.path().join("docs/readme.txt"), "hi").unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    #[test]
    fn test_parent_segments_rejected_everywhere() {
        let (_dir, guard) = guard();
        for input in [
            "..",
            "../",
            "../etc/passwd",
            "..\\",
            "..\\windows",
            "docs/../..",
            "docs/../docs",
            "docs\\..\\docs",
            "docs/sub/..",
            "./..",
        ] {
            let result = guard.resolve(input);
            assert!(
                matches!(result, Err(Error::PathEscape(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_and_drive_paths_rejected() {
        let (_dir, guard) = guard();
        for input in ["/etc", "\\windows", "C:\\Windows", "c:/x", "docs/D:evil", "//server/share"] {
            assert!(
                matches!(guard.resolve(input), Err(Error::PathEscape(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_nul_byte_rejected() {
        let (_dir, guard) = guard();
        assert!(matches!(guard.resolve("docs\0"), Err(Error::PathEscape(_))));
    }

    #[test]
    fn test_empty_and_dot_resolve_to_root() {
        let (_dir, guard) = guard();
        assert_eq!(guard.resolve("").unwrap(), guard.root());
        assert_eq!(guard.resolve(".").unwrap(), guard.root());
        assert_eq!(guard.resolve("./").unwrap(), guard.root());
    }

    #[test]
    fn test_both_separators_resolve_inside() {
        let (_dir, guard) = guard();
        let forward = guard.resolve("docs/sub").unwrap();
        let backward = guard.resolve("docs\\sub").unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, guard.root().join("docs").join("sub"));
    }

    #[test]
    fn test_nonexistent_target_inside_root_is_allowed() {
        let (_dir, guard) = guard();
        let path = guard.resolve("docs/new-folder/deeper").unwrap();
        assert!(path.starts_with(guard.root()));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        assert!(matches!(guard.resolve("link"), Err(Error::PathEscape(_))));
        assert!(matches!(guard.resolve("link/file.txt"), Err(Error::PathEscape(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let (dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("escaped.txt");
        std::os::unix::fs::symlink(&target, dir.path().join("evil")).unwrap();

        assert!(matches!(guard.resolve("evil"), Err(Error::PathEscape(_))));
        assert!(matches!(
            guard.resolve_child(guard.root(), "evil"),
            Err(Error::PathEscape(_))
        ));
        assert!(!target.exists());
    }

    #[test]
    fn test_resolve_name() {
        assert_eq!(resolve_name("notes.txt").unwrap(), "notes.txt");
        assert_eq!(resolve_name("  spaced  ").unwrap(), "spaced");
        for bad in ["", " ", ".", "..", "a/b", "a\\b", "C:x"] {
            assert!(resolve_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_resolve_child() {
        let (_dir, guard) = guard();
        let docs = guard.resolve("docs").unwrap();
        assert_eq!(guard.resolve_child(&docs, "x.txt").unwrap(), docs.join("x.txt"));
        assert!(guard.resolve_child(&docs, "../x").is_err());
    }

    #[test]
    fn test_display_is_relative() {
        let (_dir, guard) = guard();
        let path = guard.resolve("docs\\sub").unwrap();
        assert_eq!(guard.display(&path), "docs/sub");
        assert_eq!(guard.display(guard.root()), "");
        assert!(guard.is_root(&guard.resolve("").unwrap()));
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let result = PathGuard::new("/definitely/not/here/desk-root");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
