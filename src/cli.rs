use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use crate::config::TreepulseConfig;
use crate::events::ChangeEvent;

#[derive(Parser, Debug)]
#[command(name = "treepulse")]
#[command(version)]
#[command(about = "Live view of filesystem activity that recognises git operations")]
#[command(long_about = "treepulse watches a source tree, turns raw file notifications into change events and \
recognises commits, pushes, pulls, merges, rebases, checkouts and stashes from the git metadata they touch.")]
pub struct Cli {
    /// Directory to watch for changes
    #[arg(value_name = "PATH", help = "Path to watch (defaults to current directory)")]
    pub path: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    /// Show only specific file types
    #[arg(long, value_delimiter = ',', help = "File extensions to show (e.g., rs,py,go)")]
    pub extensions: Option<Vec<String>>,

    /// Extra directory names to skip
    #[arg(long, value_delimiter = ',', help = "Additional directory names to ignore")]
    pub ignore: Option<Vec<String>>,

    /// Maximum number of events to keep in the feed
    #[arg(long, help = "Maximum events shown in the live feed")]
    pub max_events: Option<usize>,

    /// Preview lines per change
    #[arg(long, help = "Trailing lines shown for changed files")]
    pub preview_lines: Option<usize>,

    /// Output format
    #[arg(long, default_value = "tui", help = "Output format")]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Terminal user interface (default)
    Tui,
    /// JSON lines for scripting
    Json,
    /// Plain text output
    Text,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// Git operations always pass; plain files are matched by extension.
    pub fn should_show(&self, event: &ChangeEvent) -> bool {
        event.is_git_operation || self.should_watch_extension(&event.path)
    }

    pub fn should_watch_extension(&self, path: &Path) -> bool {
        if let Some(ref extensions) = self.extensions {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            } else {
                false
            }
        } else {
            true // Show all files if no extensions specified
        }
    }

    /// Loads the config file and environment, then applies command line overrides.
    pub fn load_config(&self) -> anyhow::Result<TreepulseConfig> {
        let mut config = TreepulseConfig::load(self.config.as_deref())?;

        if let Some(ref ignore) = self.ignore {
            for dir in ignore {
                if !config.watcher.ignored_dirs.contains(dir) {
                    config.watcher.ignored_dirs.push(dir.clone());
                }
            }
        }
        if let Some(max) = self.max_events {
            config.feed.max_events = max;
        }
        if let Some(lines) = self.preview_lines {
            config.watcher.preview_lines = lines;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else if self.output == OutputFormat::Tui {
            // Keep the alternate screen clean
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.get_watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        if self.max_events == Some(0) {
            return Err("Max events must be greater than 0".to_string());
        }

        Ok(())
    }
}
