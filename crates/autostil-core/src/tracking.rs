//! Foreground live tracking.
//!
//! A reader thread consumes the position stream and hands fixes to a pass
//! thread. A fix that arrives while a pass is still running is dropped, so
//! a slow pass never builds a backlog of outdated positions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::automation::Automation;
use crate::position::PositionSource;
use crate::reconciler::Outcome;

/// Counters for a tracking session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Fixes that ran a live pass.
    pub processed: usize,
    /// Fixes dropped because a pass was in flight.
    pub dropped: usize,
    /// Passes that changed the residency.
    pub changes: usize,
}

#[derive(Default)]
struct Shared {
    cancel: AtomicBool,
    busy: AtomicBool,
    processed: AtomicUsize,
    dropped: AtomicUsize,
    changes: AtomicUsize,
}

impl Shared {
    fn stats(&self) -> TrackerStats {
        TrackerStats {
            processed: self.processed.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            changes: self.changes.load(Ordering::SeqCst),
        }
    }
}

/// Handle to a running tracking session.
pub struct LiveTracker {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LiveTracker {
    /// Start tracking `source`, running a live pass per accepted fix.
    ///
    /// Tracking ends when the stream ends, when [`cancel`](Self::cancel) is
    /// called, or when the override mode leaves `Auto`.
    pub fn start(automation: Arc<Automation>, source: Arc<dyn PositionSource>) -> Self {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::sync_channel(1);

        let worker = {
            let shared = shared.clone();
            let automation = automation.clone();
            thread::spawn(move || {
                for fix in rx {
                    match automation.process_fix(&fix) {
                        Ok(outcome) => {
                            if outcome.is_change() {
                                shared.changes.fetch_add(1, Ordering::SeqCst);
                            }
                            if outcome == Outcome::Suppressed {
                                info!("override active, live tracking stops");
                                shared.cancel.store(true, Ordering::SeqCst);
                            }
                        }
                        Err(e) => warn!(error = %e, "live pass failed"),
                    }
                    shared.processed.fetch_add(1, Ordering::SeqCst);
                    shared.busy.store(false, Ordering::SeqCst);
                }
            })
        };

        let reader = {
            let shared = shared.clone();
            thread::spawn(move || {
                for fix in source.stream_positions() {
                    if shared.cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    if !automation.override_mode().is_auto() {
                        info!("override active, live tracking stops");
                        shared.cancel.store(true, Ordering::SeqCst);
                        break;
                    }
                    if shared.busy.swap(true, Ordering::SeqCst) {
                        debug!("pass in flight, fix dropped");
                        shared.dropped.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    // Capacity 1 and `busy` guard: this never blocks.
                    if tx.send(fix).is_err() {
                        break;
                    }
                }
                debug!("position stream closed");
            })
        };

        info!("live tracking started");
        Self {
            shared,
            reader: Some(reader),
            worker: Some(worker),
        }
    }

    /// Ask the tracker to stop at the next fix.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TrackerStats {
        self.shared.stats()
    }

    /// Wait for the stream to end (or the tracker to be cancelled) and for
    /// the last pass to finish.
    pub fn join(mut self) -> TrackerStats {
        for handle in [self.reader.take(), self.worker.take()].into_iter().flatten() {
            if handle.join().is_err() {
                warn!("live tracking thread panicked");
            }
        }
        info!("live tracking stopped");
        self.shared.stats()
    }
}

impl Drop for LiveTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}
