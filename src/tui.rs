use std::io;
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};

use crate::cli::Cli;
use crate::config::FeedConfig;
use crate::events::{ChangeEvent, ChangeKind};
use crate::feed::{EventFeed, FeedEntry};
use crate::git::GitOperation;
use crate::watcher::FileWatcher;

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub struct TuiApp<'a> {
    pub feed: EventFeed,
    pub watcher: FileWatcher,
    pub cli: &'a Cli,
    pub should_quit: bool,
    pub show_help: bool,
    pub scroll: usize,
    tick_interval: Duration,
    last_error: Option<String>,
}

impl<'a> TuiApp<'a> {
    pub fn new(watcher: FileWatcher, config: &FeedConfig, cli: &'a Cli) -> Self {
        Self {
            feed: EventFeed::new(config),
            watcher,
            cli,
            should_quit: false,
            show_help: false,
            scroll: 0,
            tick_interval: config.tick_interval(),
            last_error: None,
        }
    }

    pub fn into_watcher(self) -> FileWatcher {
        self.watcher
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        let mut last_tick = Instant::now();

        loop {
            terminal.draw(|f| self.ui(f))?;

            self.drain_watcher();

            let timeout = self.tick_interval.saturating_sub(last_tick.elapsed());
            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            if last_tick.elapsed() >= self.tick_interval {
                self.feed.age_all();
                last_tick = Instant::now();
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    fn drain_watcher(&mut self) {
        while let Ok(event) = self.watcher.try_recv() {
            if self.cli.should_show(&event) {
                self.feed.push(event);
                self.scroll = 0;
            }
        }
        while let Ok(err) = self.watcher.try_recv_error() {
            tracing::error!("File watcher error: {}", err);
            self.last_error = Some(err.to_string());
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('h') | KeyCode::F(1) => self.show_help = !self.show_help,
            KeyCode::Up | KeyCode::Char('k') => {
                self.scroll = self.scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max_scroll = self.feed.len().saturating_sub(1);
                if self.scroll < max_scroll {
                    self.scroll += 1;
                }
            }
            KeyCode::Home => self.scroll = 0,
            KeyCode::End => self.scroll = self.feed.len().saturating_sub(1),
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        if self.show_help {
            self.render_help(f);
            return;
        }

        let banner_height = if self.feed.banner().is_some() { 3 } else { 0 };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),             // Header
                Constraint::Length(banner_height), // Git banner
                Constraint::Min(5),                // Event feed
                Constraint::Length(3),             // Status bar
            ])
            .split(f.area());

        self.render_header(f, chunks[0]);
        if banner_height > 0 {
            self.render_banner(f, chunks[1]);
        }
        self.render_feed(f, chunks[2]);
        self.render_status(f, chunks[3]);
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let spinner = SPINNER[(self.feed.ticks() as usize) % SPINNER.len()];
        let header = Paragraph::new(Line::from(vec![
            Span::styled(format!("{} ", spinner), Style::default().fg(Color::Cyan)),
            Span::styled("Watching ", Style::default().fg(Color::Rgb(150, 150, 150))),
            Span::styled(
                self.watcher.root().display().to_string(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  ({} directories)", self.watcher.watch_count()),
                Style::default().fg(Color::Rgb(120, 120, 120)),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Rgb(80, 80, 80))),
        );
        f.render_widget(header, area);
    }

    fn render_banner(&self, f: &mut Frame, area: Rect) {
        let Some(banner) = self.feed.banner() else {
            return;
        };
        let (label, color) = git_style(banner.operation);
        let banner = Paragraph::new(Line::from(vec![Span::styled(
            format!(" {} ", label),
            Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD),
        )]))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );
        f.render_widget(banner, area);
    }

    fn render_feed(&mut self, f: &mut Frame, area: Rect) {
        let mut lines = Vec::new();

        if self.feed.is_empty() {
            let dots = ".".repeat(((self.feed.ticks() / 5) % 4) as usize);
            lines.push(Line::from(Span::styled(
                format!("Waiting for changes{}", dots),
                Style::default().fg(Color::Gray),
            )));
        } else {
            let max_scroll = self.feed.len().saturating_sub(1);
            if self.scroll > max_scroll {
                self.scroll = max_scroll;
            }
            let visible = area.height.saturating_sub(2) as usize;
            for entry in self.feed.entries().skip(self.scroll) {
                lines.extend(format_entry(entry, self.cli.no_color));
                if lines.len() >= visible {
                    break;
                }
            }
        }

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Rgb(80, 80, 80)))
                    .title(format!(" Live changes ({}) ", self.feed.len()))
                    .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            )
            .wrap(Wrap { trim: false });

        f.render_widget(paragraph, area);
    }

    fn render_status(&self, f: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::styled(self.feed.status().to_string(), Style::default().fg(Color::Rgb(200, 200, 200))),
            Span::styled("  |  ", Style::default().fg(Color::Rgb(80, 80, 80))),
            Span::styled(" q ", Style::default().fg(Color::White).bg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::styled(" quit ", Style::default().fg(Color::Rgb(150, 150, 150))),
            Span::styled(" h ", Style::default().fg(Color::White).bg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::styled(" help", Style::default().fg(Color::Rgb(150, 150, 150))),
        ];
        if let Some(ref err) = self.last_error {
            spans.push(Span::styled(format!("  |  {}", err), Style::default().fg(Color::Red)));
        }

        let status = Paragraph::new(Line::from(spans))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Rgb(80, 80, 80))),
            )
            .alignment(Alignment::Center);

        f.render_widget(status, area);
    }

    fn render_help(&self, f: &mut Frame) {
        let popup_area = centered_rect(70, 50, f.area());

        let key = |k: &'static str, desc: &'static str, color: Color| {
            Line::from(vec![
                Span::styled(k, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(desc),
            ])
        };

        let help_text = vec![
            Line::from(Span::styled(
                "treepulse - live tree activity",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            key("  q, Esc     ", "- Quit", Color::Red),
            key("  h, F1      ", "- Show/hide this help", Color::Green),
            key("  ↑, k       ", "- Scroll up", Color::Blue),
            key("  ↓, j       ", "- Scroll down", Color::Blue),
            key("  Home/End   ", "- Jump to newest/oldest", Color::Blue),
            Line::from(""),
            Line::from("Git operations are recognised from the .git files they touch:"),
            Line::from("commit, push, fetch, pull, merge, rebase, stash, checkout."),
        ];

        let paragraph = Paragraph::new(help_text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Help ")
                    .title_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: true });

        f.render_widget(Clear, popup_area);
        f.render_widget(paragraph, popup_area);
    }
}

fn kind_style(kind: ChangeKind) -> (&'static str, Color) {
    match kind {
        ChangeKind::Created => ("+", Color::Green),
        ChangeKind::Modified => ("~", Color::Yellow),
        ChangeKind::Deleted => ("x", Color::Red),
        ChangeKind::Renamed => (">", Color::Blue),
    }
}

fn git_style(op: GitOperation) -> (&'static str, Color) {
    match op {
        GitOperation::Commit => ("COMMIT", Color::Green),
        GitOperation::Push => ("PUSH", Color::Magenta),
        GitOperation::Fetch => ("FETCH", Color::Cyan),
        GitOperation::Pull => ("PULL", Color::Cyan),
        GitOperation::Merge => ("MERGE", Color::Yellow),
        GitOperation::Rebase => ("REBASE", Color::LightRed),
        GitOperation::Stash => ("STASH", Color::LightBlue),
        GitOperation::Checkout => ("CHECKOUT", Color::LightMagenta),
    }
}

fn format_entry(entry: &FeedEntry, no_color: bool) -> Vec<Line<'static>> {
    let event = &entry.event;
    let (icon, label, mut color) = match event.git_operation {
        Some(op) => {
            let (label, color) = git_style(op);
            ("*", label.to_string(), color)
        }
        None => {
            let (icon, color) = kind_style(event.kind);
            (icon, event.kind.as_str().to_string(), color)
        }
    };
    if no_color {
        color = Color::Reset;
    }

    let mut op_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
    if entry.highlight && !no_color {
        op_style = op_style.bg(Color::Rgb(31, 41, 55));
    }

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("  {} {:<10}", icon, label), op_style),
        Span::styled(
            format!(" {}", event.path.display()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("  {}", time_ago(event)),
            Style::default().fg(Color::Rgb(107, 114, 128)),
        ),
    ])];

    if let Some(ref preview) = event.preview {
        for line in preview {
            lines.push(Line::from(Span::styled(
                format!("      │ {}", line),
                Style::default().fg(Color::Rgb(150, 150, 150)),
            )));
        }
    }
    lines
}

fn time_ago(event: &ChangeEvent) -> String {
    let ago = Local::now().signed_duration_since(event.timestamp);
    if ago.num_seconds() < 1 {
        "just now".to_string()
    } else if ago.num_minutes() < 1 {
        format!("{}s ago", ago.num_seconds())
    } else {
        format!("{}m ago", ago.num_minutes())
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>, io::Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<(), io::Error> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_entry_with_preview() {
        let event = ChangeEvent::file(PathBuf::from("src/main.rs"), "main.rs".into(), ChangeKind::Modified, 10)
            .with_preview(Some(vec!["fn main() {}".to_string()]));
        let entry = FeedEntry { event, age: 0, highlight: true };

        let lines = format_entry(&entry, false);
        assert_eq!(lines.len(), 2);
        let header: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(header.contains("modified"));
        assert!(header.contains("src/main.rs"));
    }

    #[test]
    fn test_format_git_entry() {
        let event = ChangeEvent::git(PathBuf::from(".git/FETCH_HEAD"), "FETCH_HEAD".into(), ChangeKind::Modified, 0, GitOperation::Fetch);
        let entry = FeedEntry { event, age: 40, highlight: false };

        let lines = format_entry(&entry, true);
        assert_eq!(lines.len(), 1);
        let header: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(header.contains("FETCH"));
    }
}
