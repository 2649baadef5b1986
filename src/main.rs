use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use treepulse::{
    cli::{Cli, OutputFormat},
    config::TreepulseConfig,
    tui::{restore_terminal, setup_terminal, TuiApp},
    ChangeEvent, ChangeKind, FileWatcher,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();
    let config = cli.load_config()?;

    let watch_path = cli.get_watch_path();
    tracing::info!("Starting treepulse on: {}", watch_path.display());

    match cli.output {
        OutputFormat::Tui => run_tui_mode(&cli, &config).await?,
        OutputFormat::Json | OutputFormat::Text | OutputFormat::Compact => {
            run_stream_mode(&cli, &config).await?
        }
    }

    Ok(())
}

async fn run_tui_mode(cli: &Cli, config: &TreepulseConfig) -> Result<()> {
    let watcher = FileWatcher::new(cli.get_watch_path(), &config.watcher)?;

    let mut terminal = setup_terminal()?;
    let mut app = TuiApp::new(watcher, &config.feed, cli);
    let res = app.run(&mut terminal);

    if let Err(err) = restore_terminal(&mut terminal) {
        eprintln!("Failed to restore terminal: {}", err);
    }

    app.into_watcher().stop().await;

    if let Err(err) = res {
        eprintln!("Application error: {}", err);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_stream_mode(cli: &Cli, config: &TreepulseConfig) -> Result<()> {
    let mut watcher = FileWatcher::new(cli.get_watch_path(), &config.watcher)?;

    if cli.output == OutputFormat::Text {
        println!("Watching: {} ({} directories)", watcher.root().display(), watcher.watch_count());
        println!("Press Ctrl+C to quit");
        println!("---");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        while let Ok(err) = watcher.try_recv_error() {
            tracing::error!("File watcher error: {}", err);
        }

        let event = tokio::select! {
            event = watcher.recv() => match event {
                Some(event) => event,
                None => break, // pipeline gone
            },
            _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
        };
        if !cli.should_show(&event) {
            continue;
        }
        match cli.output {
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
            OutputFormat::Compact => print_compact_event(&event),
            _ => print_text_event(&event, cli),
        }
    }

    watcher.stop().await;
    Ok(())
}

fn print_text_event(event: &ChangeEvent, cli: &Cli) {
    let time_str = event.timestamp.format("%H:%M:%S");

    let label = match event.git_operation {
        Some(op) => format!("GIT {}", op.as_str().to_uppercase()),
        None => event.kind.as_str().to_uppercase(),
    };

    if cli.no_color {
        println!("[{}] {} {}", time_str, label, event.path.display());
    } else {
        let color = match (event.is_git_operation, event.kind) {
            (true, _) => "\x1b[35m",                    // Magenta
            (false, ChangeKind::Created) => "\x1b[32m",  // Green
            (false, ChangeKind::Modified) => "\x1b[33m", // Yellow
            (false, ChangeKind::Deleted) => "\x1b[31m",  // Red
            (false, ChangeKind::Renamed) => "\x1b[34m",  // Blue
        };
        println!("[{}] {}{}\x1b[0m {}", time_str, color, label, event.path.display());
    }

    if let Some(preview) = &event.preview {
        for line in preview {
            println!("  | {}", line);
        }
    }
}

fn print_compact_event(event: &ChangeEvent) {
    let event_type = match (event.git_operation, event.kind) {
        (Some(_), _) => "G",
        (None, ChangeKind::Created) => "C",
        (None, ChangeKind::Modified) => "M",
        (None, ChangeKind::Deleted) => "D",
        (None, ChangeKind::Renamed) => "R",
    };

    match event.git_operation {
        Some(op) => println!("{} {} {}", event_type, op, event.path.display()),
        None => println!("{} {}", event_type, event.path.display()),
    }
}
