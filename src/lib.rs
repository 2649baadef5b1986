pub mod cli;
pub mod config;
pub mod events;
pub mod feed;
pub mod filter;
pub mod git;
pub mod preview;
pub mod tui;
pub mod watch_set;
pub mod watcher;

pub use config::{FeedConfig, TreepulseConfig, WatcherConfig};
pub use events::*;
pub use feed::{EventFeed, FeedEntry, GitBanner};
pub use filter::PathFilter;
pub use git::{classify, Classification, GitOperation};
pub use preview::extract_preview;
pub use watch_set::{WatchBackend, WatchSet};
pub use watcher::{EventPipeline, FileWatcher, PipelineInputs, PipelineOutputs};
