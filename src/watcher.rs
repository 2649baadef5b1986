use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecommendedWatcher;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use crate::config::WatcherConfig;
use crate::events::{ChangeEvent, ChangeKind, RawKind, RawNotification};
use crate::filter::{is_editor_transient, is_hidden, PathFilter};
use crate::git::{classify, Classification};
use crate::preview::extract_preview;
use crate::watch_set::{WatchBackend, WatchSet};

/// Receiving ends the pipeline reads from.
///
/// Both channels are bounded: a pipeline that stops reading parks the OS
/// watcher thread, and the OS queue absorbs the rest.
pub struct PipelineInputs {
    pub notifications: mpsc::Receiver<RawNotification>,
    pub errors: mpsc::Receiver<notify::Error>,
    pub stop: oneshot::Receiver<()>,
}

/// Bounded sending ends the pipeline publishes to.
pub struct PipelineOutputs {
    pub events: mpsc::Sender<ChangeEvent>,
    pub errors: mpsc::Sender<notify::Error>,
}

/// Turns raw notifications into classified [`ChangeEvent`]s.
pub struct EventPipeline<B: WatchBackend> {
    watch_set: WatchSet<B>,
    preview_lines: usize,
    preview_width: usize,
    backlog: VecDeque<RawNotification>,
}

/// Input that arrived while a blocking job was running.
#[derive(Default)]
struct Received {
    notifications: VecDeque<RawNotification>,
    errors: VecDeque<notify::Error>,
}

impl<B: WatchBackend> EventPipeline<B> {
    pub fn new(watch_set: WatchSet<B>, config: &WatcherConfig) -> Self {
        Self {
            watch_set,
            preview_lines: config.preview_lines,
            preview_width: config.preview_width,
            backlog: VecDeque::new(),
        }
    }

    pub fn watch_set(&self) -> &WatchSet<B> {
        &self.watch_set
    }

    /// Classifies one notification. Returns `None` when it is discarded.
    ///
    /// Creating a directory registers it (and, with backfill, queues its
    /// existing contents) before anything else is looked at. Removing or
    /// renaming one away drops its watches from the set.
    pub fn process(&mut self, raw: RawNotification) -> Option<ChangeEvent> {
        // A later creation at the same path arrives after this one
        if matches!(raw.kind, RawKind::Removed | RawKind::Renamed) {
            self.watch_set.forget(&raw.path);
        }

        let name = raw.path.file_name()?.to_string_lossy().into_owned();

        if is_editor_transient(&name) {
            tracing::debug!("Skipping editor temp file {}", raw.path.display());
            return None;
        }

        let kind = match ChangeKind::from_raw(raw.kind) {
            Some(kind) => kind,
            None => return None, // chmod
        };

        let is_dir = raw.kind == RawKind::Created && is_real_dir(&raw.path);
        if is_dir {
            let found = self.watch_set.on_created_dir(&raw.path);
            self.backlog.extend(found);
        }

        let rel = self.watch_set.relative(&raw.path).to_path_buf();
        let rel = if rel.as_os_str().is_empty() { raw.path.clone() } else { rel };

        let operation = match classify(&rel, &name) {
            Classification::Suppress => {
                tracing::debug!("Suppressed {}", rel.display());
                return None;
            }
            Classification::Git(op) => Some(op),
            Classification::Ordinary if is_hidden(&name) => return None,
            Classification::Ordinary => None,
        };

        let size = std::fs::metadata(&raw.path).map(|m| m.len()).unwrap_or(0);

        let event = match operation {
            Some(op) => ChangeEvent::git(rel, name, kind, size, op),
            None => {
                let preview = if kind.has_content() && !is_dir && raw.path.is_file() {
                    extract_preview(&raw.path, self.preview_lines, self.preview_width)
                } else {
                    None
                };
                ChangeEvent::file(rel, name, kind, size).with_preview(preview)
            }
        };
        Some(event)
    }

    /// Next queued backfill notification, if any.
    fn next_backlog(&mut self) -> Option<RawNotification> {
        self.backlog.pop_front()
    }
}

impl<B: WatchBackend + Send + 'static> EventPipeline<B> {
    /// Receive loop. Ends on stop, when the notification source closes, or
    /// when nobody is left to receive events. Dropping the pipeline
    /// afterwards releases the OS watch handle.
    ///
    /// Each notification is processed on the blocking pool since it stats,
    /// reads and walks the filesystem. Input is only buffered in memory while
    /// a directory is being registered.
    pub async fn run(self, inputs: PipelineInputs, outputs: PipelineOutputs) {
        let PipelineInputs {
            mut notifications,
            errors: mut os_errors,
            mut stop,
        } = inputs;
        let mut os_errors_open = true;
        let mut received = Received::default();
        let mut pipeline = self;

        loop {
            if let Some(err) = received.errors.pop_front() {
                if !forward_error(err, &outputs.errors, &mut stop).await {
                    break;
                }
                continue;
            }

            let raw = match pipeline
                .next_backlog()
                .or_else(|| received.notifications.pop_front())
            {
                Some(raw) => raw,
                None => {
                    tokio::select! {
                        biased;
                        _ = &mut stop => break,
                        next = notifications.recv() => match next {
                            Some(raw) => raw,
                            None => break,
                        },
                        next = os_errors.recv(), if os_errors_open => {
                            match next {
                                Some(err) => received.errors.push_back(err),
                                None => os_errors_open = false,
                            }
                            continue;
                        }
                    }
                }
            };

            let registers = raw.kind == RawKind::Created && is_real_dir(&raw.path);
            let job = tokio::task::spawn_blocking(move || {
                let event = pipeline.process(raw);
                (pipeline, event)
            });
            let done = if registers {
                tokio::select! {
                    biased;
                    _ = &mut stop => {
                        tracing::debug!("Pipeline stopped while registering a directory");
                        return;
                    }
                    done = drain_while(job, &mut notifications, &mut os_errors, &mut os_errors_open, &mut received) => done,
                }
            } else {
                tokio::select! {
                    biased;
                    _ = &mut stop => return,
                    done = job => done,
                }
            };
            let event = match done {
                Ok((returned, event)) => {
                    pipeline = returned;
                    event
                }
                Err(err) => {
                    tracing::error!("Pipeline worker failed: {}", err);
                    return;
                }
            };

            if let Some(event) = event {
                // Blocks while the consumer is behind, but never past a stop
                tokio::select! {
                    biased;
                    _ = &mut stop => break,
                    res = outputs.events.send(event) => {
                        if res.is_err() {
                            tracing::debug!("Event receiver dropped, stopping pipeline");
                            break;
                        }
                    }
                }
            }
        }

        tracing::debug!("Pipeline for {} stopped", pipeline.watch_set.root().display());
    }
}

/// Waits for `job` while buffering input that arrives meanwhile. Registering
/// a watch needs the OS watcher thread, which may be parked on a full channel.
async fn drain_while<T>(
    mut job: JoinHandle<T>,
    notifications: &mut mpsc::Receiver<RawNotification>,
    os_errors: &mut mpsc::Receiver<notify::Error>,
    os_errors_open: &mut bool,
    received: &mut Received,
) -> Result<T, JoinError> {
    loop {
        tokio::select! {
            biased;
            done = &mut job => return done,
            Some(raw) = notifications.recv() => received.notifications.push_back(raw),
            next = os_errors.recv(), if *os_errors_open => match next {
                Some(err) => received.errors.push_back(err),
                None => *os_errors_open = false,
            },
        }
    }
}

/// Publishes one OS error. Returns `false` if stop fired first.
async fn forward_error(
    err: notify::Error,
    errors: &mpsc::Sender<notify::Error>,
    stop: &mut oneshot::Receiver<()>,
) -> bool {
    tokio::select! {
        biased;
        _ = stop => false,
        res = errors.send(err) => {
            if res.is_err() {
                tracing::debug!("Error receiver dropped");
            }
            true
        }
    }
}

/// A directory that is not a symlink.
fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path).map_or(false, |meta| meta.is_dir())
}

/// Runs the initial walk while a helper thread empties both channels, for
/// the same reason as [`drain_while`]. Returns what the helper collected.
fn initialize_draining(
    path: &Path,
    watcher: RecommendedWatcher,
    filter: PathFilter,
    backfill: bool,
    notifications: &mut mpsc::Receiver<RawNotification>,
    os_errors: &mut mpsc::Receiver<notify::Error>,
) -> (Result<WatchSet<RecommendedWatcher>>, Vec<RawNotification>, Vec<notify::Error>) {
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let helper = scope.spawn(|| {
            let mut raws = Vec::new();
            let mut errs = Vec::new();
            loop {
                let finished = done.load(Ordering::Acquire);
                while let Ok(raw) = notifications.try_recv() {
                    raws.push(raw);
                }
                while let Ok(err) = os_errors.try_recv() {
                    errs.push(err);
                }
                if finished {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            (raws, errs)
        });

        let result = WatchSet::initialize(path, watcher, filter, backfill);
        done.store(true, Ordering::Release);
        let (raws, errs) = helper.join().unwrap_or_default();
        (result, raws, errs)
    })
}

/// Live watch over one directory tree.
///
/// Owns the receiving ends of the event and error channels and the stop
/// signal of the pipeline task. Must be created inside a tokio runtime.
pub struct FileWatcher {
    root: PathBuf,
    watch_count: usize,
    event_rx: mpsc::Receiver<ChangeEvent>,
    error_rx: mpsc::Receiver<notify::Error>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new<P: AsRef<Path>>(path: P, config: &WatcherConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("FileWatcher must be created inside a tokio runtime")?;

        let (raw_tx, mut raw_rx) = mpsc::channel::<RawNotification>(config.notification_capacity);
        let (os_err_tx, mut os_err_rx) = mpsc::channel::<notify::Error>(config.error_capacity);

        // Runs on the OS watcher's own thread
        let watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for raw in RawNotification::from_notify(event) {
                        if raw_tx.blocking_send(raw).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = os_err_tx.blocking_send(err);
                }
            })
            .context("Failed to create file system watcher")?;

        let filter = PathFilter::new(config.ignored_dirs.iter().cloned());
        let (watch_set, early, early_errors) = initialize_draining(
            path.as_ref(),
            watcher,
            filter,
            config.backfill_new_dirs,
            &mut raw_rx,
            &mut os_err_rx,
        );
        let watch_set = watch_set?;
        let root = watch_set.root().to_path_buf();
        let watch_count = watch_set.count();

        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (error_tx, error_rx) = mpsc::channel(config.error_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();

        for err in early_errors {
            if error_tx.try_send(err).is_err() {
                tracing::warn!("Dropped a watcher error raised during startup");
            }
        }

        let mut pipeline = EventPipeline::new(watch_set, config);
        pipeline.backlog.extend(early);
        let task = runtime.spawn(pipeline.run(
            PipelineInputs {
                notifications: raw_rx,
                errors: os_err_rx,
                stop: stop_rx,
            },
            PipelineOutputs {
                events: event_tx,
                errors: error_tx,
            },
        ));

        Ok(Self {
            root,
            watch_count,
            event_rx,
            error_rx,
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories registered by the initial walk.
    pub fn watch_count(&self) -> usize {
        self.watch_count
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.event_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<ChangeEvent, mpsc::error::TryRecvError> {
        self.event_rx.try_recv()
    }

    /// Waits up to `timeout`; `None` on timeout or after the pipeline ended.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<ChangeEvent> {
        tokio::time::timeout(timeout, self.event_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn try_recv_error(&mut self) -> Result<notify::Error, mpsc::error::TryRecvError> {
        self.error_rx.try_recv()
    }

    /// Signals the pipeline and waits for it to release the OS watch.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!("Watcher task ended abnormally: {}", err);
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
