//! Debounced configuration watcher.
//!
//! A dedicated worker thread turns raw change signals into reloads. Signals
//! come from two places: explicit [`ChangeNotifier::notify`] calls (for
//! callers that already receive change events) and periodic polling of the
//! source revision. Each signal restarts the debounce window; the reload runs
//! once the window passes with no further signal, so a burst of writes costs
//! one rebuild.
//!
//! Reload failures are counted and logged. They never stop the worker and
//! never replace the live registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use crate::engine::RuleEngine;
use crate::error::{RulesResult, WatcherError};
use crate::reload::ReloadOutcome;
use crate::source::SourceRevision;

/// Quiet period after the last change signal before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const IDLE_TICK: Duration = Duration::from_secs(1);

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a reload fires.
    pub debounce: Duration,
    /// How often to check the source revision; `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Max queued notifications; extra ones coalesce.
    pub event_queue_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: Some(Duration::from_millis(250)),
            event_queue_capacity: 64,
        }
    }
}

/// Counters reported by [`ConfigWatcher::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    /// Change signals observed (notifications and revision changes).
    pub raw_events: u64,
    /// Reloads that installed a new registry.
    pub reloads: u64,
    /// Reloads skipped because the content was unchanged.
    pub skipped: u64,
    /// Reloads that failed; the previous registry stayed live.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    raw_events: AtomicU64,
    reloads: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WatcherStats {
        WatcherStats {
            raw_events: self.raw_events.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle for reporting that the configuration may have changed.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: Sender<()>,
    counters: Arc<Counters>,
}

impl ChangeNotifier {
    /// Signals a change. Never blocks.
    pub fn notify(&self) {
        if self.try_notify().is_err() {
            tracing::debug!("config watcher stopped; change signal dropped");
        }
    }

    /// Signals a change, reporting whether the watcher is still running.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Disconnected`] once the watcher has stopped.
    pub fn try_notify(&self) -> Result<(), WatcherError> {
        self.counters.raw_events.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(()) {
            // A queued signal already restarts the window.
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(WatcherError::Disconnected),
        }
    }
}

/// Background watcher driving [`RuleEngine::reload_if_changed`].
///
/// Dropping the watcher stops the worker and waits for it to exit.
#[derive(Debug)]
pub struct ConfigWatcher {
    engine: Arc<RuleEngine>,
    notifier: ChangeNotifier,
    counters: Arc<Counters>,
    shutdown_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::SpawnFailed`] if the thread cannot be created.
    pub fn spawn(engine: Arc<RuleEngine>, cfg: WatcherConfig) -> RulesResult<Self> {
        let (events_tx, events_rx) = bounded::<()>(cfg.event_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            engine: Arc::clone(&engine),
            counters: Arc::clone(&counters),
            // Compare against what the engine loaded, not what the source
            // holds now, so an edit made before the spawn still reloads.
            last_revision: engine.loaded_revision(),
            debounce: cfg.debounce,
            poll_interval: cfg.poll_interval,
        };
        let join = thread::Builder::new()
            .name("ticket-rules-watcher".to_string())
            .spawn(move || worker.run(&events_rx, &shutdown_rx))
            .map_err(|e| WatcherError::SpawnFailed { message: e.to_string() })?;

        tracing::info!(
            source = %engine.describe_source(),
            debounce_ms = u64::try_from(cfg.debounce.as_millis()).unwrap_or(u64::MAX),
            polling = cfg.poll_interval.is_some(),
            "config watcher started"
        );

        Ok(Self {
            engine,
            notifier: ChangeNotifier {
                tx: events_tx,
                counters: Arc::clone(&counters),
            },
            counters,
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        })
    }

    /// Signals a change; same as the notifier's `notify`.
    pub fn notify(&self) {
        self.notifier.notify();
    }

    /// A handle other components can use to signal changes.
    #[must_use]
    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WatcherStats {
        self.counters.snapshot()
    }

    /// The engine being reloaded.
    #[must_use]
    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        // Disconnecting the shutdown channel wakes the worker.
        drop(self.shutdown_tx.take());
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                tracing::error!("config watcher worker panicked");
            }
        }
    }
}

struct Worker {
    engine: Arc<RuleEngine>,
    counters: Arc<Counters>,
    last_revision: Option<SourceRevision>,
    debounce: Duration,
    poll_interval: Option<Duration>,
}

impl Worker {
    fn run(mut self, events_rx: &Receiver<()>, shutdown_rx: &Receiver<()>) {
        let mut deadline: Option<Instant> = None;
        let mut next_poll = self.poll_interval.map(|p| Instant::now() + p);

        loop {
            let wait = next_wake(deadline, next_poll);
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(events_rx) -> msg => {
                    if msg.is_ok() {
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
                default(wait) => {}
            }

            let now = Instant::now();
            if let (Some(due), Some(interval)) = (next_poll, self.poll_interval) {
                if now >= due {
                    if self.revision_changed() {
                        self.counters.raw_events.fetch_add(1, Ordering::Relaxed);
                        deadline = Some(now + self.debounce);
                    }
                    next_poll = Some(now + interval);
                }
            }

            if deadline.is_some_and(|d| now >= d) {
                deadline = None;
                // Anything written after this read triggers another round.
                self.last_revision = current_revision(&self.engine);
                self.reload();
            }
        }

        tracing::info!("config watcher stopped");
    }

    fn revision_changed(&mut self) -> bool {
        let current = current_revision(&self.engine);
        if current == self.last_revision {
            return false;
        }
        self.last_revision = current;
        true
    }

    fn reload(&self) {
        match self.engine.reload_if_changed() {
            Ok(ReloadOutcome::Installed { generation, .. }) => {
                self.counters.reloads.fetch_add(1, Ordering::Relaxed);
                tracing::info!(generation, "configuration change applied");
            }
            Ok(ReloadOutcome::Unchanged { .. }) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("configuration content unchanged");
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, retryable = err.is_retryable(), "configuration reload failed; keeping live rules");
            }
        }
    }
}

fn current_revision(engine: &RuleEngine) -> Option<SourceRevision> {
    match engine.source_revision() {
        Ok(rev) => rev,
        Err(err) => {
            tracing::debug!(error = %err, "source revision unavailable");
            None
        }
    }
}

fn next_wake(deadline: Option<Instant>, next_poll: Option<Instant>) -> Duration {
    let now = Instant::now();
    [deadline, next_poll]
        .into_iter()
        .flatten()
        .map(|t| t.saturating_duration_since(now))
        .min()
        .unwrap_or(IDLE_TICK)
        .min(IDLE_TICK)
}
