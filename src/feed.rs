//! Consumer-side view of the event stream.
//!
//! The feed keeps the newest events first, caps its length and decays
//! highlights as ticks pass. It never talks to the pipeline directly; the
//! display layer pushes whatever it drains from the channel.

use std::collections::VecDeque;

use crate::config::FeedConfig;
use crate::events::ChangeEvent;
use crate::git::GitOperation;

#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub event: ChangeEvent,
    /// Ticks since the entry was pushed
    pub age: u32,
    pub highlight: bool,
}

/// The most recent git operation, shown until it ages out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitBanner {
    pub operation: GitOperation,
    pub ticks: u32,
}

#[derive(Debug, Clone)]
pub struct EventFeed {
    entries: VecDeque<FeedEntry>,
    max_events: usize,
    highlight_ticks: u32,
    banner_ticks: u32,
    banner: Option<GitBanner>,
    status: String,
    ticks: u64,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

impl EventFeed {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.max_events),
            max_events: config.max_events,
            highlight_ticks: config.highlight_ticks,
            banner_ticks: config.banner_ticks,
            banner: None,
            status: "Watching".to_string(),
            ticks: 0,
        }
    }

    /// Inserts `event` at the front, dropping the oldest entries past the cap.
    pub fn push(&mut self, event: ChangeEvent) {
        self.status = match event.git_operation {
            Some(op) => {
                self.banner = Some(GitBanner { operation: op, ticks: 0 });
                format!("Git {} detected!", op)
            }
            None => format!("File {}: {}", event.kind, event.name),
        };

        self.entries.push_front(FeedEntry {
            event,
            age: 0,
            highlight: true,
        });
        while self.entries.len() > self.max_events {
            self.entries.pop_back();
        }
    }

    /// Advances every entry by one tick.
    pub fn age_all(&mut self) {
        self.ticks += 1;

        for entry in self.entries.iter_mut() {
            entry.age = entry.age.saturating_add(1);
            if entry.age > self.highlight_ticks {
                entry.highlight = false;
            }
        }

        if let Some(banner) = self.banner.as_mut() {
            banner.ticks += 1;
            if banner.ticks > self.banner_ticks {
                self.banner = None;
            }
        }
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&FeedEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn banner(&self) -> Option<GitBanner> {
        self.banner
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Ticks seen since creation; drives spinners in the view.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
