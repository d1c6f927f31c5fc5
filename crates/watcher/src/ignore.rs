//! Ignore pattern management for source paths
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (editor temp and OS metadata files - always active)
//! 2. .mapignore patterns (optional, enabled by default)
//! 3. Config-based patterns (additional custom patterns)

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Name of the per-directory ignore file
pub const IGNORE_FILE_NAME: &str = ".mapignore";

/// Ignore rule manager
///
/// Built-in patterns always win; `.mapignore` and configured patterns are
/// evaluated with gitignore semantics relative to the source directory.
pub struct IgnoreRules {
    /// Source directory the patterns are relative to
    root: PathBuf,

    /// Patterns from `.mapignore` (optional)
    mapignore: Option<Gitignore>,

    /// Patterns from configuration (optional)
    configured: Option<Gitignore>,
}

impl IgnoreRules {
    /// Load ignore rules for a source directory
    pub fn load(source_dir: &Path, use_ignore_file: bool, patterns: &[String]) -> Result<Self> {
        // Keys are canonical, so the root has to be too for prefix stripping
        let root = std::fs::canonicalize(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());

        let mapignore = if use_ignore_file {
            let ignore_path = root.join(IGNORE_FILE_NAME);
            if ignore_path.is_file() {
                let mut builder = GitignoreBuilder::new(&root);
                if let Some(err) = builder.add(&ignore_path) {
                    return Err(err)
                        .with_context(|| format!("Failed to read {}", ignore_path.display()));
                }
                Some(builder.build()?)
            } else {
                None
            }
        } else {
            None
        };

        let configured = if patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(&root);
            for pattern in patterns {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
            }
            Some(builder.build()?)
        };

        Ok(Self {
            root,
            mapignore,
            configured,
        })
    }

    /// Check if path should be ignored
    pub fn should_ignore(&self, path: &Path) -> bool {
        if is_builtin_ignored(path) {
            return true;
        }

        // Matching needs paths inside the root; anything else is left alone
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        for rules in [&self.mapignore, &self.configured].into_iter().flatten() {
            if rules.matched_path_or_any_parents(relative, false).is_ignore() {
                return true;
            }
        }

        false
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let mut count = 1; // Built-in always active
        if self.mapignore.is_some() {
            count += 1;
        }
        if self.configured.is_some() {
            count += 1;
        }
        count
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Editor temporaries and OS metadata files
///
/// Covers: Vim, Emacs, generic backups, MacOS/Windows system files
fn is_builtin_ignored(path: &Path) -> bool {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    // Vim swap files
    if filename.ends_with(".swp") || filename.ends_with(".swo") || filename.ends_with(".swx") {
        return true;
    }

    // Backups (~, .bak) and in-progress saves
    if filename.ends_with('~') || filename.ends_with(".bak") || filename.ends_with(".tmp") {
        return true;
    }

    // Emacs auto-save (#*#) and lock files (.#*)
    if (filename.starts_with('#') && filename.ends_with('#')) || filename.starts_with(".#") {
        return true;
    }

    // MacOS resource forks
    if filename.starts_with("._") {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_patterns_always_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(temp_dir.path(), true, &[]).unwrap();
        let root = rules.root().to_path_buf();

        assert!(rules.should_ignore(&root.join(".#town.tmx")));
        assert!(rules.should_ignore(&root.join("#town.tmx#")));
        assert!(rules.should_ignore(&root.join("town.tmx~")));
        assert!(rules.should_ignore(&root.join("._town.tmx")));
        assert!(rules.should_ignore(&root.join("town.tmx.swp")));

        assert!(!rules.should_ignore(&root.join("town.tmx")));
        assert!(!rules.should_ignore(&root.join("Level1.TMX")));
    }

    #[test]
    fn test_mapignore_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(IGNORE_FILE_NAME), "draft_*.tmx\nscratch/\n")?;

        let rules = IgnoreRules::load(temp_dir.path(), true, &[])?;
        let root = rules.root().to_path_buf();

        assert_eq!(rules.active_sources(), 2);
        assert!(rules.should_ignore(&root.join("draft_castle.tmx")));
        assert!(rules.should_ignore(&root.join("scratch/cave.tmx")));
        assert!(!rules.should_ignore(&root.join("castle.tmx")));

        Ok(())
    }

    #[test]
    fn test_mapignore_disabled() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(IGNORE_FILE_NAME), "*.tmx\n")?;

        let rules = IgnoreRules::load(temp_dir.path(), false, &[])?;
        let root = rules.root().to_path_buf();

        assert_eq!(rules.active_sources(), 1);
        assert!(!rules.should_ignore(&root.join("castle.tmx")));

        Ok(())
    }

    #[test]
    fn test_additional_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let patterns = vec!["wip/".to_string(), "*_old.tmx".to_string()];
        let rules = IgnoreRules::load(temp_dir.path(), false, &patterns).unwrap();
        let root = rules.root().to_path_buf();

        assert_eq!(rules.active_sources(), 2);
        assert!(rules.should_ignore(&root.join("wip/town.tmx")));
        assert!(rules.should_ignore(&root.join("town_old.tmx")));
        assert!(!rules.should_ignore(&root.join("town.tmx")));
    }

    #[test]
    fn test_paths_outside_root_are_not_matched() {
        let temp_dir = TempDir::new().unwrap();
        let patterns = vec!["*.tmx".to_string()];
        let rules = IgnoreRules::load(temp_dir.path(), false, &patterns).unwrap();

        assert!(!rules.should_ignore(Path::new("/elsewhere/town.tmx")));
    }
}
