use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use notify::event::{EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

use crate::git::GitOperation;

/// Mutation kind as reported by the OS notification primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Removed,
    Renamed,
    PermissionChanged,
}

/// One path touched by one OS notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub path: PathBuf,
    pub kind: RawKind,
}

impl RawNotification {
    pub fn new(path: impl Into<PathBuf>, kind: RawKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Splits a notify event into per-path notifications.
    ///
    /// Rename halves are mapped so the destination looks like a creation and
    /// the source like a rename; the combined report is dropped because both
    /// halves arrive separately.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => RawKind::Created,
            EventKind::Remove(_) => RawKind::Removed,
            EventKind::Modify(ModifyKind::Metadata(_)) => RawKind::PermissionChanged,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => RawKind::Renamed,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawKind::Created,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
            EventKind::Modify(ModifyKind::Name(_)) => RawKind::Renamed,
            EventKind::Modify(_) => RawKind::Modified,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .map(|path| Self { path, kind })
            .collect()
    }
}

/// Public mutation kind carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    /// Permission-only changes have no public kind.
    pub fn from_raw(kind: RawKind) -> Option<Self> {
        match kind {
            RawKind::Created => Some(Self::Created),
            RawKind::Modified => Some(Self::Modified),
            RawKind::Removed => Some(Self::Deleted),
            RawKind::Renamed => Some(Self::Renamed),
            RawKind::PermissionChanged => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        }
    }

    pub fn has_content(&self) -> bool {
        matches!(self, Self::Created | Self::Modified)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified change, ready for the display layer.
///
/// `git_operation` is set exactly when `is_git_operation` is true, and
/// `preview` only ever accompanies ordinary created/modified events. Use the
/// constructors to keep those pairs consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Path relative to the watched root
    pub path: PathBuf,
    pub name: String,
    pub kind: ChangeKind,
    /// Processing time, not the file's mtime
    pub timestamp: DateTime<Local>,
    pub size: u64,
    pub is_git_operation: bool,
    pub git_operation: Option<GitOperation>,
    pub preview: Option<Vec<String>>,
}

impl ChangeEvent {
    pub fn file(path: PathBuf, name: String, kind: ChangeKind, size: u64) -> Self {
        Self {
            path,
            name,
            kind,
            timestamp: Local::now(),
            size,
            is_git_operation: false,
            git_operation: None,
            preview: None,
        }
    }

    pub fn git(
        path: PathBuf,
        name: String,
        kind: ChangeKind,
        size: u64,
        operation: GitOperation,
    ) -> Self {
        Self {
            path,
            name,
            kind,
            timestamp: Local::now(),
            size,
            is_git_operation: true,
            git_operation: Some(operation),
            preview: None,
        }
    }

    /// Attaches preview lines; ignored for git operations and for kinds without content.
    pub fn with_preview(mut self, preview: Option<Vec<String>>) -> Self {
        if !self.is_git_operation && self.kind.has_content() {
            self.preview = preview;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn notify_event(kind: EventKind, paths: &[&str]) -> notify::Event {
        let mut event = notify::Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_notify_kind_mapping() {
        let created = RawNotification::from_notify(notify_event(
            EventKind::Create(CreateKind::File),
            &["/w/a.rs"],
        ));
        assert_eq!(created, vec![RawNotification::new("/w/a.rs", RawKind::Created)]);

        let modified = RawNotification::from_notify(notify_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/w/a.rs"],
        ));
        assert_eq!(modified[0].kind, RawKind::Modified);

        let removed = RawNotification::from_notify(notify_event(
            EventKind::Remove(RemoveKind::File),
            &["/w/a.rs"],
        ));
        assert_eq!(removed[0].kind, RawKind::Removed);

        let chmod = RawNotification::from_notify(notify_event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/w/a.rs"],
        ));
        assert_eq!(chmod[0].kind, RawKind::PermissionChanged);
    }

    #[test]
    fn test_rename_halves() {
        let from = RawNotification::from_notify(notify_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/w/old.rs"],
        ));
        assert_eq!(from, vec![RawNotification::new("/w/old.rs", RawKind::Renamed)]);

        let to = RawNotification::from_notify(notify_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/w/new.rs"],
        ));
        assert_eq!(to, vec![RawNotification::new("/w/new.rs", RawKind::Created)]);

        let both = RawNotification::from_notify(notify_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/old.rs", "/w/new.rs"],
        ));
        assert!(both.is_empty());
    }

    #[test]
    fn test_access_events_dropped() {
        let access = RawNotification::from_notify(notify_event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/w/a.rs"],
        ));
        assert!(access.is_empty());
    }

    #[test]
    fn test_change_kind_from_raw() {
        assert_eq!(ChangeKind::from_raw(RawKind::Removed), Some(ChangeKind::Deleted));
        assert_eq!(ChangeKind::from_raw(RawKind::Renamed), Some(ChangeKind::Renamed));
        assert_eq!(ChangeKind::from_raw(RawKind::PermissionChanged), None);
    }

    #[test]
    fn test_git_event_never_carries_preview() {
        let event = ChangeEvent::git(
            PathBuf::from(".git/COMMIT_EDITMSG"),
            "COMMIT_EDITMSG".to_string(),
            ChangeKind::Modified,
            12,
            GitOperation::Commit,
        )
        .with_preview(Some(vec!["message".to_string()]));

        assert!(event.is_git_operation);
        assert_eq!(event.git_operation, Some(GitOperation::Commit));
        assert!(event.preview.is_none());
    }

    #[test]
    fn test_preview_only_for_content_kinds() {
        let deleted = ChangeEvent::file(
            PathBuf::from("a.rs"),
            "a.rs".to_string(),
            ChangeKind::Deleted,
            0,
        )
        .with_preview(Some(vec!["x".to_string()]));
        assert!(deleted.preview.is_none());

        let modified = ChangeEvent::file(
            PathBuf::from("a.rs"),
            "a.rs".to_string(),
            ChangeKind::Modified,
            1,
        )
        .with_preview(Some(vec!["x".to_string()]));
        assert_eq!(modified.preview, Some(vec!["x".to_string()]));
        assert!(!modified.is_git_operation);
        assert!(modified.git_operation.is_none());
    }

    #[test]
    fn test_event_serializes_lowercase_kinds() {
        let event = ChangeEvent::git(
            PathBuf::from(".git/refs/remotes/origin/main"),
            "main".to_string(),
            ChangeKind::Modified,
            41,
            GitOperation::Push,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"modified\""));
        assert!(json.contains("\"git_operation\":\"push\""));
    }
}
