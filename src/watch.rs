//! Watch mode: keep the catalog in sync while the library changes.
//!
//! ## Threads
//!
//! ```text
//! notify callback ──Fs──────────┐
//! Ctrl-C handler ──Shutdown─────┤
//!                               ▼
//!                         control loop ──job──▶ scan worker (owns the Reconciler)
//!                               ▲                    │
//!                               └───ScanFinished─────┘
//! ```
//!
//! Everything arrives on one channel as a [`Signal`]. The control loop owns a
//! [`Debouncer`] and a [`StabilityTracker`] and is the only place that decides
//! when a pass starts, so at most one pass is ever in flight.
//!
//! ## Scheduling
//!
//! - Filesystem events while idle (re)arm a single deadline `debounce_ms` out.
//! - Events while a pass runs only set a pending flag. When the pass finishes
//!   the flag is cleared and the deadline re-armed.
//! - When the deadline fires, every path touched since the last pass must have
//!   kept the same size and mtime for `stability_ms`. Until then the check is
//!   repeated every `poll_interval_ms`. Half-copied files are never cataloged.
//! - A notify error, an overflow (`Flag::Rescan`) or an event without paths
//!   arms the deadline like any other change, so lost events still end in a
//!   full pass.
//!
//! ## Shutdown
//!
//! A [`Signal::Shutdown`] cancels the deadline and drops any pending rescan. A
//! pass already running is allowed to finish, then the worker is joined and
//! the catalog flushed.
//!
//! A failed pass is logged and the watcher keeps running; the next change
//! retries.

use crate::catalog::Catalog;
use crate::config::LibraryConfig;
use crate::reconcile::{Reconciler, ScanReport, SyncError};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Failed to start scan worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Scan worker panicked")]
    WorkerPanicked,
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Everything the control loop reacts to.
#[derive(Debug)]
pub enum Signal {
    Fs(notify::Result<Event>),
    ScanFinished(Result<ScanReport, SyncError>),
    Shutdown,
}

// =============================================================================
// Debouncer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
}

/// Coalesces bursts of events into single passes.
///
/// Pure state machine; callers supply the clock.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    phase: Phase,
    pending_rescan: bool,
    deadline: Option<Instant>,
    stopped: bool,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            phase: Phase::Idle,
            pending_rescan: false,
            deadline: None,
            stopped: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn pending_rescan(&self) -> bool {
        self.pending_rescan
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// A relevant filesystem change happened at `now`.
    pub fn on_event(&mut self, now: Instant) {
        if self.stopped {
            return;
        }
        match self.phase {
            Phase::Idle => self.deadline = Some(now + self.delay),
            Phase::Scanning => self.pending_rescan = true,
        }
    }

    /// True when idle and the deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.phase == Phase::Idle && !self.stopped && self.deadline.is_some_and(|d| d <= now)
    }

    /// Push the deadline out without changing state.
    pub fn defer(&mut self, until: Instant) {
        if self.phase == Phase::Idle && !self.stopped {
            self.deadline = Some(until);
        }
    }

    /// Enter `Scanning`. Returns false if a pass is already running or the
    /// debouncer was shut down.
    pub fn begin_scan(&mut self) -> bool {
        if self.phase == Phase::Scanning || self.stopped {
            return false;
        }
        self.phase = Phase::Scanning;
        self.deadline = None;
        true
    }

    pub fn finish_scan(&mut self, now: Instant) {
        self.phase = Phase::Idle;
        if self.pending_rescan && !self.stopped {
            self.pending_rescan = false;
            self.deadline = Some(now + self.delay);
        }
    }

    /// Cancel the deadline and never schedule again.
    pub fn shutdown(&mut self) {
        self.stopped = true;
        self.deadline = None;
        self.pending_rescan = false;
    }
}

// =============================================================================
// Write stability
// =============================================================================

/// Size and mtime; `None` once the path is gone.
pub type Fingerprint = Option<(u64, Option<SystemTime>)>;

pub fn fingerprint(path: &Path) -> Fingerprint {
    std::fs::metadata(path)
        .ok()
        .map(|m| (m.len(), m.modified().ok()))
}

#[derive(Debug, Clone)]
struct Observation {
    fingerprint: Fingerprint,
    since: Instant,
    observed: bool,
}

/// Tracks paths touched since the last pass until they stop changing.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    window: Duration,
    paths: HashMap<PathBuf, Observation>,
}

impl StabilityTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            paths: HashMap::new(),
        }
    }

    pub fn touch(&mut self, path: PathBuf, now: Instant) {
        self.paths.insert(
            path,
            Observation {
                fingerprint: None,
                since: now,
                observed: false,
            },
        );
    }

    pub fn pending(&self) -> usize {
        self.paths.len()
    }

    /// Re-stat every tracked path and forget the ones that have settled.
    /// Returns true when nothing is left unsettled.
    ///
    /// A path that no longer exists counts as settled.
    pub fn settle_with(&mut self, now: Instant, stat: impl Fn(&Path) -> Fingerprint) -> bool {
        let window = self.window;
        self.paths.retain(|path, obs| {
            let current = stat(path);
            if current.is_none() {
                return false;
            }
            if !obs.observed || current != obs.fingerprint {
                obs.fingerprint = current;
                obs.since = now;
                obs.observed = true;
            }
            now.duration_since(obs.since) < window
        });
        self.paths.is_empty()
    }

    pub fn settle(&mut self, now: Instant) -> bool {
        self.settle_with(now, fingerprint)
    }
}

// =============================================================================
// Scan worker
// =============================================================================

/// Something that can run a pass on the worker thread.
pub trait PassRunner: Send + 'static {
    fn run_pass(&mut self) -> Result<ScanReport, SyncError>;

    /// Called once after the worker has stopped.
    fn close(self) -> Result<(), SyncError>
    where
        Self: Sized;
}

impl<C: Catalog + Send + 'static> PassRunner for Reconciler<C> {
    fn run_pass(&mut self) -> Result<ScanReport, SyncError> {
        Reconciler::run_pass(self)
    }

    fn close(self) -> Result<(), SyncError> {
        self.into_catalog()?;
        Ok(())
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Paths and timings for watch mode.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub library_root: PathBuf,
    /// Events under these paths are ignored.
    pub ignore: Vec<PathBuf>,
    pub debounce: Duration,
    pub stability: Duration,
    pub poll_interval: Duration,
}

impl WatchSettings {
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            library_root: config.library_root(),
            ignore: config.catalog_path_forms(),
            debounce: config.watch.debounce(),
            stability: config.watch.stability(),
            poll_interval: config.watch.poll_interval(),
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore.iter().any(|i| path.starts_with(i))
    }
}

/// Totals for a whole watch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub passes: usize,
    pub failed_passes: usize,
}

/// Cloneable handle that stops a running watcher.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Sender<Signal>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // The loop may already be gone.
        let _ = self.0.send(Signal::Shutdown);
    }
}

type Reporter = Box<dyn FnMut(&ScanReport) + Send>;

pub struct LibraryWatcher<R: PassRunner> {
    settings: WatchSettings,
    runner: R,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    reporter: Option<Reporter>,
}

impl<R: PassRunner> LibraryWatcher<R> {
    pub fn new(settings: WatchSettings, runner: R) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            settings,
            runner,
            tx,
            rx,
            reporter: None,
        }
    }

    /// Called on the control thread with every successful pass.
    pub fn on_report(mut self, reporter: impl FnMut(&ScanReport) + Send + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.clone())
    }

    /// Watch the library root until shut down. Runs one pass immediately.
    pub fn run(self) -> Result<WatchSummary, WatchError> {
        let fs_tx = self.tx.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(Signal::Fs(res));
        })?;
        watcher.watch(&self.settings.library_root, RecursiveMode::Recursive)?;
        info!(root = %self.settings.library_root.display(), "watching library");

        let summary = self.control_loop();
        drop(watcher);
        summary
    }

    fn control_loop(self) -> Result<WatchSummary, WatchError> {
        let LibraryWatcher {
            settings,
            mut runner,
            tx,
            rx,
            mut reporter,
        } = self;

        let (job_tx, job_rx) = mpsc::channel::<()>();
        let done_tx = tx.clone();
        let worker = thread::Builder::new()
            .name("library-scan".into())
            .spawn(move || {
                for () in job_rx {
                    let result = runner.run_pass();
                    if done_tx.send(Signal::ScanFinished(result)).is_err() {
                        break;
                    }
                }
                runner
            })
            .map_err(WatchError::Spawn)?;
        // Only the worker and the handles keep the channel open now.
        drop(tx);

        let mut debouncer = Debouncer::new(settings.debounce);
        let mut tracker = StabilityTracker::new(settings.stability);
        let mut summary = WatchSummary::default();

        if debouncer.begin_scan() && job_tx.send(()).is_err() {
            return Err(WatchError::WorkerPanicked);
        }

        loop {
            let signal = match debouncer.deadline() {
                Some(deadline) => {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(signal) => Some(signal),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                },
            };
            let now = Instant::now();

            match signal {
                Some(Signal::Fs(Ok(event))) => {
                    if matches!(event.kind, EventKind::Access(_)) && !event.need_rescan() {
                        continue;
                    }
                    if event.need_rescan() || event.paths.is_empty() {
                        // Nothing to settle on; a full pass finds whatever changed.
                        warn!(kind = ?event.kind, "watch events lost, scheduling a full pass");
                        debouncer.on_event(now);
                        continue;
                    }
                    let mut relevant = false;
                    for path in event.paths {
                        if settings.is_ignored(&path) {
                            continue;
                        }
                        debug!(path = %path.display(), kind = ?event.kind, "library changed");
                        tracker.touch(path, now);
                        relevant = true;
                    }
                    if relevant {
                        debouncer.on_event(now);
                    }
                }
                Some(Signal::Fs(Err(e))) => {
                    warn!(error = %e, "watch error, scheduling a full pass");
                    debouncer.on_event(now);
                }
                Some(Signal::ScanFinished(result)) => {
                    match result {
                        Ok(report) => {
                            summary.passes += 1;
                            if let Some(reporter) = reporter.as_mut() {
                                reporter(&report);
                            }
                        }
                        Err(e) => {
                            summary.failed_passes += 1;
                            error!(error = %e, "library pass failed; waiting for the next change");
                        }
                    }
                    debouncer.finish_scan(now);
                    if debouncer.is_stopped() {
                        break;
                    }
                }
                Some(Signal::Shutdown) => {
                    info!("shutting down watcher");
                    debouncer.shutdown();
                    if debouncer.phase() == Phase::Idle {
                        break;
                    }
                    info!("waiting for the running pass to finish");
                }
                None => {}
            }

            if debouncer.is_due(now) {
                if tracker.settle(now) {
                    if debouncer.begin_scan() && job_tx.send(()).is_err() {
                        break;
                    }
                } else {
                    debug!(unsettled = tracker.pending(), "waiting for writes to settle");
                    debouncer.defer(now + settings.poll_interval);
                }
            }
        }

        drop(job_tx);
        let runner = worker.join().map_err(|_| WatchError::WorkerPanicked)?;
        runner.close()?;
        info!(
            passes = summary.passes,
            failed = summary.failed_passes,
            "watcher stopped"
        );
        Ok(summary)
    }
}
