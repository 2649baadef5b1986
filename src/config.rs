//! Configuration management for treepulse
//!
//! Defaults can be overridden from a TOML file, then from environment
//! variables, then from command line flags (see [`crate::cli`]).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::DEFAULT_IGNORED_DIRS;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreepulseConfig {
    /// Watch pipeline configuration
    pub watcher: WatcherConfig,
    /// Event feed configuration
    pub feed: FeedConfig,
}

/// Configuration for the watch pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Capacity of the channel between the OS watcher and the pipeline
    pub notification_capacity: usize,
    /// Capacity of the outbound event channel
    pub event_capacity: usize,
    /// Capacity of the outbound error channel
    pub error_capacity: usize,
    /// Number of trailing lines kept in a preview
    pub preview_lines: usize,
    /// Maximum preview line width, ellipsis included
    pub preview_width: usize,
    /// Directory names whose subtrees are never watched
    pub ignored_dirs: Vec<String>,
    /// Report entries already present in a newly created directory
    pub backfill_new_dirs: bool,
}

/// Configuration for the consumer-side event feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum number of events retained
    pub max_events: usize,
    /// Ticks an event stays highlighted
    pub highlight_ticks: u32,
    /// Ticks a git operation banner stays visible
    pub banner_ticks: u32,
    /// Tick interval in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            notification_capacity: 100,
            event_capacity: 100,
            error_capacity: 10,
            preview_lines: 3,
            preview_width: 60,
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
            backfill_new_dirs: true,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_events: 50,
            highlight_ticks: 30, // 3 seconds
            banner_ticks: 50,    // 5 seconds
            tick_interval_ms: 100,
        }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl TreepulseConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load from `path` if given, otherwise defaults, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    /// Override with environment variables if present
    pub fn with_env(mut self) -> Self {
        if let Some(capacity) = env_parse::<usize>("TREEPULSE_EVENT_CAPACITY") {
            self.watcher.event_capacity = capacity;
        }
        if let Some(lines) = env_parse::<usize>("TREEPULSE_PREVIEW_LINES") {
            self.watcher.preview_lines = lines;
        }
        if let Some(max) = env_parse::<usize>("TREEPULSE_MAX_EVENTS") {
            self.feed.max_events = max;
        }
        if let Some(ms) = env_parse::<u64>("TREEPULSE_TICK_MS") {
            self.feed.tick_interval_ms = ms;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.watcher.notification_capacity == 0 {
            bail!("notification_capacity must be greater than 0");
        }
        if self.watcher.event_capacity == 0 {
            bail!("event_capacity must be greater than 0");
        }
        if self.watcher.error_capacity == 0 {
            bail!("error_capacity must be greater than 0");
        }
        if self.watcher.preview_width < 4 {
            bail!("preview_width must be at least 4");
        }
        if self.feed.max_events == 0 {
            bail!("max_events must be greater than 0");
        }
        if self.feed.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than 0");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
