use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::events::{RawKind, RawNotification};
use crate::filter::{PathFilter, METADATA_DIR};

/// Metadata directories watched even when the walk would not reach them;
/// operation detection depends on notifications from these.
const METADATA_WATCH_DIRS: &[&[&str]] = &[
    &[],
    &["refs"],
    &["refs", "heads"],
    &["refs", "remotes"],
    &["logs"],
    &["logs", "refs"],
    &["logs", "refs", "heads"],
];

/// Registers a single, non-recursive directory watch with the OS primitive.
pub trait WatchBackend {
    fn watch_dir(&mut self, path: &Path) -> notify::Result<()>;
}

impl WatchBackend for RecommendedWatcher {
    fn watch_dir(&mut self, path: &Path) -> notify::Result<()> {
        self.watch(path, RecursiveMode::NonRecursive)
    }
}

/// The live set of watched directories under one root.
///
/// Only the pipeline task mutates it, so it carries no synchronization.
pub struct WatchSet<B: WatchBackend> {
    backend: B,
    root: PathBuf,
    filter: PathFilter,
    backfill: bool,
    watched: HashSet<PathBuf>,
}

impl<B: WatchBackend> WatchSet<B> {
    /// Resolves `root`, walks it and registers every accepted directory.
    ///
    /// Only an unresolvable or unreadable root is an error; individual
    /// registration failures are logged and skipped.
    pub fn initialize<P: AsRef<Path>>(
        root: P,
        backend: B,
        filter: PathFilter,
        backfill: bool,
    ) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("Failed to resolve watch root {}", root.display()))?;
        if !root.is_dir() {
            bail!("Watch root is not a directory: {}", root.display());
        }
        std::fs::read_dir(&root)
            .with_context(|| format!("Failed to open watch root {}", root.display()))?;

        let mut set = Self {
            backend,
            root: root.clone(),
            filter,
            backfill,
            watched: HashSet::new(),
        };

        set.walk(&root, false);

        let metadata_root = root.join(METADATA_DIR);
        for parts in METADATA_WATCH_DIRS {
            let dir = parts.iter().fold(metadata_root.clone(), |dir, part| dir.join(part));
            if dir.is_dir() {
                set.register(&dir);
            }
        }

        tracing::info!("Watching {} directories under {}", set.count(), root.display());
        Ok(set)
    }

    /// Covers a freshly created directory and everything already inside it.
    ///
    /// Returns synthetic creations for the entries found when backfill is
    /// enabled, so content written before the watch existed is still reported.
    ///
    /// A symlink to a directory is not followed, matching the initial walk.
    pub fn on_created_dir(&mut self, path: &Path) -> Vec<RawNotification> {
        if self.watched.contains(path) {
            return Vec::new();
        }
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(meta) if meta.file_type().is_symlink() => {
                tracing::debug!("Not following link {}", path.display());
                return Vec::new();
            }
            _ => return Vec::new(),
        }
        if self.filter.should_ignore(self.relative(path), true) {
            tracing::debug!("Not watching ignored directory {}", path.display());
            return Vec::new();
        }
        self.walk(path, self.backfill)
    }

    /// Drops `path` and everything below it from the set once the directory
    /// is gone. The OS discards those watches itself; forgetting them lets a
    /// directory recreated at the same path be registered again.
    pub fn forget(&mut self, path: &Path) -> usize {
        let before = self.watched.len();
        self.watched.retain(|dir| !dir.starts_with(path));
        let removed = before - self.watched.len();
        if removed > 0 {
            tracing::debug!("Forgot {} watches under {}", removed, path.display());
        }
        removed
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the root, or `path` itself when it lies outside.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    pub fn count(&self) -> usize {
        self.watched.len()
    }

    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.watched.contains(path.as_ref())
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn register(&mut self, dir: &Path) -> bool {
        if self.watched.contains(dir) {
            return false;
        }
        match self.backend.watch_dir(dir) {
            Ok(()) => {
                self.watched.insert(dir.to_path_buf());
                true
            }
            Err(err) => {
                tracing::warn!("Failed to watch {}: {}", dir.display(), err);
                false
            }
        }
    }

    /// Registers `dir` and every accepted directory below it. With `collect`,
    /// every accepted entry below `dir` is returned as a creation in walk order.
    fn walk(&mut self, dir: &Path, collect: bool) -> Vec<RawNotification> {
        let root = self.root.clone();
        let filter = self.filter.clone();
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                !filter.should_ignore(rel, is_dir)
            })
            .build();

        let mut found = Vec::new();
        for result in walker {
            match result {
                Ok(entry) => {
                    let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                    if is_dir {
                        self.register(entry.path());
                    }
                    if collect && entry.depth() > 0 {
                        found.push(RawNotification::new(entry.path(), RawKind::Created));
                    }
                }
                Err(err) => {
                    tracing::warn!("Error walking directory: {}", err);
                }
            }
        }
        found
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingBackend;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        for dir in [
            "src/core",
            "node_modules/left-pad",
            ".idea",
            ".git/refs/heads",
            ".git/refs/remotes/origin",
            ".git/logs/refs/heads",
            ".git/objects/ab",
        ] {
            fs::create_dir_all(root.join(dir)).expect("Failed to create dir");
        }
        fs::write(root.join("src/main.rs"), "fn main() {}").expect("Failed to write file");
        temp_dir
    }

    fn canonical(temp_dir: &TempDir) -> PathBuf {
        fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize")
    }

    #[test]
    fn test_initial_walk_applies_filter() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");

        assert_eq!(set.root(), root.as_path());
        assert!(set.contains(&root));
        assert!(set.contains(root.join("src")));
        assert!(set.contains(root.join("src/core")));
        assert!(set.contains(root.join(".git/refs/heads")));
        assert!(set.contains(root.join(".git/refs/remotes/origin")));
        assert!(set.contains(root.join(".git/objects/ab")));
        assert!(!set.contains(root.join("node_modules")));
        assert!(!set.contains(root.join("node_modules/left-pad")));
        assert!(!set.contains(root.join(".idea")));
        // Files are never watched individually
        assert!(!set.contains(root.join("src/main.rs")));
    }

    #[test]
    fn test_no_duplicate_registrations() {
        let temp_dir = tree();
        let set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");

        let added = &set.backend().added;
        let unique: HashSet<_> = added.iter().collect();
        assert_eq!(unique.len(), added.len());
        assert_eq!(set.count(), added.len());
    }

    #[test]
    fn test_metadata_dirs_forced_when_parent_ignored() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        // An ignore list that would otherwise prune the refs directory
        let filter = PathFilter::new(["refs"]);
        let set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), filter, true)
            .expect("Failed to initialize");

        assert!(set.contains(root.join(".git/refs")));
        assert!(set.contains(root.join(".git/refs/heads")));
        assert!(set.contains(root.join(".git/logs/refs")));
        assert!(!set.contains(root.join(".git/refs/remotes/origin")));
    }

    #[test]
    fn test_registration_failures_are_skipped() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let backend = RecordingBackend {
            refuse: vec![root.join("src")],
            ..Default::default()
        };
        let set = WatchSet::initialize(temp_dir.path(), backend, PathFilter::default(), true)
            .expect("Failed to initialize");

        assert!(!set.contains(root.join("src")));
        assert!(set.contains(root.join("src/core")));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let result = WatchSet::initialize(
            temp_dir.path().join("does-not-exist"),
            RecordingBackend::default(),
            PathFilter::default(),
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_file_root_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, "x").expect("Failed to write file");
        let result = WatchSet::initialize(&file, RecordingBackend::default(), PathFilter::default(), true);
        assert!(result.is_err());
    }

    #[test]
    fn test_created_directory_with_backfill() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let mut set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");

        fs::create_dir_all(root.join("pkg/inner")).expect("Failed to create dir");
        fs::write(root.join("pkg/a.txt"), "a").expect("Failed to write file");
        fs::write(root.join("pkg/inner/b.txt"), "b").expect("Failed to write file");
        fs::write(root.join("pkg/.hidden"), "h").expect("Failed to write file");

        let backfill = set.on_created_dir(&root.join("pkg"));

        assert!(set.contains(root.join("pkg")));
        assert!(set.contains(root.join("pkg/inner")));
        assert_eq!(
            backfill,
            vec![
                RawNotification::new(root.join("pkg/a.txt"), RawKind::Created),
                RawNotification::new(root.join("pkg/inner"), RawKind::Created),
                RawNotification::new(root.join("pkg/inner/b.txt"), RawKind::Created),
            ]
        );

        // A second notification for the same directory is a no-op
        assert!(set.on_created_dir(&root.join("pkg")).is_empty());
    }

    #[test]
    fn test_recreated_directory_is_registered_again() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let mut set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");
        let core = root.join("src/core");
        assert!(set.contains(&core));

        fs::remove_dir_all(&core).expect("Failed to remove dir");
        assert_eq!(set.forget(&core), 1);
        assert!(!set.contains(&core));
        assert!(set.contains(root.join("src")));

        fs::create_dir(&core).expect("Failed to create dir");
        fs::write(core.join("b.txt"), "b").expect("Failed to write file");
        let backfill = set.on_created_dir(&core);

        assert!(set.contains(&core));
        assert_eq!(set.backend().added.iter().filter(|p| **p == core).count(), 2);
        assert_eq!(backfill, vec![RawNotification::new(core.join("b.txt"), RawKind::Created)]);
    }

    #[test]
    fn test_forget_drops_subtree_only() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let mut set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");

        assert_eq!(set.forget(&root.join(".git/refs")), 4);
        assert!(!set.contains(root.join(".git/refs/remotes/origin")));
        assert!(set.contains(root.join(".git/logs/refs/heads")));
        // Sibling whose name shares a prefix
        assert_eq!(set.forget(&root.join("sr")), 0);
        assert!(set.contains(root.join("src")));
    }

    #[cfg(unix)]
    #[test]
    fn test_created_symlink_to_directory_not_followed() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let outside = TempDir::new().expect("Failed to create temp dir");
        for i in 0..3 {
            let dir = outside.path().join(format!("d{}", i));
            fs::create_dir(&dir).expect("Failed to create dir");
            fs::write(dir.join("f.txt"), "x").expect("Failed to write file");
        }
        let mut set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");
        let before = set.count();

        let link = root.join("link");
        std::os::unix::fs::symlink(outside.path(), &link).expect("Failed to create symlink");

        assert!(set.on_created_dir(&link).is_empty());
        assert!(!set.contains(&link));
        assert_eq!(set.count(), before);
    }

    #[test]
    fn test_created_directory_without_backfill() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let mut set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), false)
            .expect("Failed to initialize");

        fs::create_dir_all(root.join("pkg")).expect("Failed to create dir");
        fs::write(root.join("pkg/a.txt"), "a").expect("Failed to write file");

        assert!(set.on_created_dir(&root.join("pkg")).is_empty());
        assert!(set.contains(root.join("pkg")));
    }

    #[test]
    fn test_created_ignored_directory() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let mut set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");
        let before = set.count();

        fs::create_dir_all(root.join("web/dist")).expect("Failed to create dir");
        fs::create_dir_all(root.join(".cache")).expect("Failed to create dir");

        assert!(set.on_created_dir(&root.join("web/dist")).is_empty());
        assert!(set.on_created_dir(&root.join(".cache")).is_empty());
        assert_eq!(set.count(), before);
    }

    #[test]
    fn test_relative_paths() {
        let temp_dir = tree();
        let root = canonical(&temp_dir);
        let set = WatchSet::initialize(temp_dir.path(), RecordingBackend::default(), PathFilter::default(), true)
            .expect("Failed to initialize");

        assert_eq!(set.relative(&root.join("src/main.rs")), Path::new("src/main.rs"));
        assert_eq!(set.relative(Path::new("/elsewhere/x")), Path::new("/elsewhere/x"));
    }
}
