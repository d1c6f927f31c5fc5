//! Canonical identity of a source file

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Canonical absolute path of a source file
///
/// Two notifications for the same file (one from the startup scan, one from
/// the watcher, possibly spelled differently) map to the same key.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceKey(Arc<Path>);

impl SourceKey {
    /// Build a key for `path`
    ///
    /// Resolves symlinks when the file exists; otherwise falls back to a
    /// purely lexical normalization against the current directory.
    pub fn from_path(path: &Path) -> Self {
        match std::fs::canonicalize(path) {
            Ok(canonical) => Self(canonical.into()),
            Err(_) => Self(normalize_lexically(path).into()),
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// File name without its extension (`maps/town.tmx` -> `town`)
    pub fn file_stem(&self) -> Option<&str> {
        self.0.file_stem().and_then(|stem| stem.to_str())
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for SourceKey {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Make `path` absolute and drop `.`/`..` components without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_normalized_lexically() {
        let key = SourceKey::from_path(Path::new("/no/such/./maps/../maps/town.tmx"));
        assert_eq!(key.as_path(), Path::new("/no/such/maps/town.tmx"));
        assert_eq!(key.file_stem(), Some("town"));
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let key = SourceKey::from_path(Path::new("definitely-missing/dungeon.tmx"));
        assert!(key.as_path().is_absolute());
        assert!(key.as_path().ends_with("definitely-missing/dungeon.tmx"));
    }

    #[test]
    fn test_spellings_of_existing_file_share_a_key() {
        let temp_dir = TempDir::new().unwrap();
        let maps = temp_dir.path().join("maps");
        fs::create_dir_all(&maps).unwrap();
        fs::write(maps.join("town.tmx"), b"<map/>").unwrap();

        let direct = SourceKey::from_path(&maps.join("town.tmx"));
        let dotted = SourceKey::from_path(&maps.join(".").join("town.tmx"));
        let parent = SourceKey::from_path(&maps.join("..").join("maps").join("town.tmx"));

        assert_eq!(direct, dotted);
        assert_eq!(direct, parent);
        assert_eq!(direct.to_string(), direct.as_path().display().to_string());
    }
}
