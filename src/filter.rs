use std::path::Path;

/// Name of the version-control metadata directory.
pub const METADATA_DIR: &str = ".git";

/// Dependency and build cache directories that are never walked.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["node_modules", "vendor", "dist", "__pycache__"];

/// Decides which entries of the watched tree are ever observed.
#[derive(Debug, Clone)]
pub struct PathFilter {
    ignored_dirs: Vec<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()))
    }
}

impl PathFilter {
    pub fn new<I, S>(ignored_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored_dirs: ignored_dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true when `path` (relative to the watched root) must not be observed.
    ///
    /// Ignored directory names prune the whole subtree. Hidden entries are
    /// rejected unless they are the metadata directory or live inside it.
    pub fn should_ignore<P: AsRef<Path>>(&self, path: P, is_dir: bool) -> bool {
        let path = path.as_ref();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };

        if is_dir && self.ignored_dirs.iter().any(|d| d == name) {
            return true;
        }

        is_hidden(name) && name != METADATA_DIR && !is_metadata_path(path)
    }

    pub fn ignored_dirs(&self) -> &[String] {
        &self.ignored_dirs
    }
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// True if any component of `path` is the metadata directory.
pub fn is_metadata_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .components()
        .any(|comp| comp.as_os_str() == METADATA_DIR)
}

/// Transient names written by editors during safe saves: `*.tmp*`, `*~`, `#*`.
pub fn is_editor_transient(name: &str) -> bool {
    name.contains(".tmp") || name.ends_with('~') || name.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_directories() {
        let filter = PathFilter::default();

        assert!(filter.should_ignore("node_modules", true));
        assert!(filter.should_ignore("web/vendor", true));
        assert!(filter.should_ignore("pkg/__pycache__", true));
        assert!(!filter.should_ignore("src", true));
        // Only directories are pruned by name
        assert!(!filter.should_ignore("dist", false));
    }

    #[test]
    fn test_hidden_entries() {
        let filter = PathFilter::default();

        assert!(filter.should_ignore(".idea", true));
        assert!(filter.should_ignore("src/.env", false));
        assert!(filter.should_ignore(".main.rs.swp", false));
        assert!(!filter.should_ignore("README.md", false));
    }

    #[test]
    fn test_metadata_directory_is_kept() {
        let filter = PathFilter::default();

        assert!(!filter.should_ignore(".git", true));
        assert!(!filter.should_ignore(".git/refs/heads", true));
        // Hidden names inside the metadata directory are still observed
        assert!(!filter.should_ignore(".git/.keep", false));
        // A sibling that merely shares the prefix is not the metadata directory
        assert!(filter.should_ignore(".github", true));
        assert!(filter.should_ignore(".gitignore", false));
    }

    #[test]
    fn test_custom_ignore_list() {
        let filter = PathFilter::new(["target", "build"]);

        assert!(filter.should_ignore("target", true));
        assert!(filter.should_ignore("app/build", true));
        assert!(!filter.should_ignore("node_modules", true));
        assert_eq!(filter.ignored_dirs().len(), 2);
    }

    #[test]
    fn test_editor_transient_names() {
        assert!(is_editor_transient("editor.go.tmp"));
        assert!(is_editor_transient("main.rs.tmp.12345"));
        assert!(is_editor_transient("notes.txt~"));
        assert!(is_editor_transient("#scratch.el#"));
        assert!(!is_editor_transient("main.rs"));
        assert!(!is_editor_transient("template.html"));
    }

    #[test]
    fn test_metadata_path_detection() {
        assert!(is_metadata_path(".git/HEAD"));
        assert!(is_metadata_path("sub/.git/index"));
        assert!(!is_metadata_path(".github/workflows/ci.yml"));
        assert!(!is_metadata_path("src/git.rs"));
    }
}
