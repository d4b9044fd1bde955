//! Hand-off of event frames to a persistence sink.
//!
//! Frames are moved into the saver, never shared: once handed over, the
//! loop cannot touch them again. In background mode a single worker thread
//! drains a bounded channel; `finish()` closes the channel and joins the
//! worker so no accepted frame is dropped at shutdown.

use super::config::SavePolicy;
use super::sink::{PersistError, PersistenceSink};
use crate::capture::Frame;
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Counts of completed saves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    /// Frames written successfully.
    pub saved: u64,
    /// Frames the sink rejected.
    pub failed: u64,
}

struct SaveJob {
    frame: Frame,
    event_id: u64,
}

struct Worker {
    tx: Sender<SaveJob>,
    handle: JoinHandle<SaveStats>,
}

enum Mode {
    Inline(Box<dyn PersistenceSink>),
    Background(Option<Worker>),
}

/// Owns the persistence sink and the saving policy.
///
/// Failures are also published through a shared counter, so they are
/// visible while a background worker is still running.
pub struct EventSaver {
    mode: Mode,
    stats: SaveStats,
    failures: Arc<AtomicU64>,
}

impl EventSaver {
    /// Saves inline on the calling thread.
    pub fn blocking(sink: Box<dyn PersistenceSink>) -> Self {
        Self {
            mode: Mode::Inline(sink),
            stats: SaveStats::default(),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawns a worker thread fed by a channel of `queue_depth` frames.
    ///
    /// When the channel is full, `save()` blocks until the worker catches
    /// up; memory stays bounded.
    pub fn background(
        mut sink: Box<dyn PersistenceSink>,
        queue_depth: usize,
    ) -> Result<Self, PersistError> {
        let (tx, rx) = bounded::<SaveJob>(queue_depth.max(1));
        let failures = Arc::new(AtomicU64::new(0));
        let worker_failures = Arc::clone(&failures);

        let handle = std::thread::Builder::new()
            .name("stillwatch-saver".into())
            .spawn(move || {
                let mut stats = SaveStats::default();
                for job in rx.iter() {
                    let result = sink.save_event(&job.frame, job.event_id);
                    if result.is_err() {
                        worker_failures.fetch_add(1, Ordering::Relaxed);
                    }
                    record(&mut stats, job.event_id, result);
                }
                stats
            })
            .map_err(PersistError::Spawn)?;

        Ok(Self {
            mode: Mode::Background(Some(Worker { tx, handle })),
            stats: SaveStats::default(),
            failures,
        })
    }

    /// Builds a saver according to `policy`.
    pub fn with_policy(
        sink: Box<dyn PersistenceSink>,
        policy: SavePolicy,
        queue_depth: usize,
    ) -> Result<Self, PersistError> {
        match policy {
            SavePolicy::Blocking => Ok(Self::blocking(sink)),
            SavePolicy::Background => Self::background(sink, queue_depth),
        }
    }

    /// Persists (or enqueues) one frame.
    ///
    /// In background mode an `Ok` means the frame was accepted; the write
    /// itself is reported by the worker.
    pub fn save(&mut self, frame: Frame, event_id: u64) -> Result<(), PersistError> {
        let handed_off = match &mut self.mode {
            Mode::Inline(sink) => {
                let result = sink.save_event(&frame, event_id);
                let failed = result.is_err();
                if failed {
                    self.stats.failed += 1;
                    self.failures.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.saved += 1;
                    tracing::info!(event = event_id, sequence = frame.sequence(), "Event frame saved");
                }
                return result;
            }
            Mode::Background(Some(worker)) => worker
                .tx
                .send(SaveJob { frame, event_id })
                .map_err(|_| PersistError::WorkerGone),
            Mode::Background(None) => Err(PersistError::WorkerGone),
        };
        if handed_off.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        handed_off
    }

    /// Frames that failed so far, including writes the worker has already
    /// attempted and frames it never accepted.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Statistics for inline saves, or for the worker after `finish()`.
    pub fn stats(&self) -> SaveStats {
        self.stats
    }

    /// Waits for all accepted frames to be written.
    ///
    /// Idempotent; later `save()` calls in background mode fail.
    pub fn finish(&mut self) -> SaveStats {
        if let Mode::Background(worker) = &mut self.mode {
            if let Some(Worker { tx, handle }) = worker.take() {
                drop(tx);
                match handle.join() {
                    Ok(stats) => {
                        self.stats.saved += stats.saved;
                        self.stats.failed += stats.failed;
                    }
                    Err(_) => tracing::error!("Persistence worker panicked"),
                }
            }
        }
        self.stats
    }
}

impl Drop for EventSaver {
    fn drop(&mut self) {
        self.finish();
    }
}

fn record(stats: &mut SaveStats, event_id: u64, result: Result<(), PersistError>) {
    match result {
        Ok(()) => {
            stats.saved += 1;
            tracing::info!(event = event_id, "Event frame saved");
        }
        Err(e) => {
            stats.failed += 1;
            tracing::warn!(event = event_id, error = %e, "Failed to save event frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordingSink;

    #[test]
    fn test_blocking_saves_inline() {
        let sink = RecordingSink::new();
        let mut saver = EventSaver::blocking(Box::new(sink.clone()));

        saver.save(Frame::filled(2, 2, 1, 0, 1), 0).unwrap();
        saver.save(Frame::filled(2, 2, 1, 0, 2), 1).unwrap();

        assert_eq!(sink.saved().len(), 2);
        assert_eq!(saver.stats(), SaveStats { saved: 2, failed: 0 });
    }

    #[test]
    fn test_blocking_reports_failure() {
        let sink = RecordingSink::new();
        sink.fail_on(0);
        let mut saver = EventSaver::blocking(Box::new(sink.clone()));

        assert!(saver.save(Frame::filled(2, 2, 1, 0, 1), 0).is_err());
        assert_eq!(saver.stats().failed, 1);
        assert_eq!(saver.failures(), 1);
    }

    #[test]
    fn test_background_finish_joins_all() {
        let sink = RecordingSink::new();
        sink.fail_on(3);
        let mut saver = EventSaver::background(Box::new(sink.clone()), 2).unwrap();

        for id in 0..6 {
            saver.save(Frame::filled(4, 4, 3, 9, id + 1), id).unwrap();
        }
        let stats = saver.finish();

        assert_eq!(stats, SaveStats { saved: 5, failed: 1 });
        let ids: Vec<u64> = sink.saved().iter().map(|s| s.event_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 4, 5]);
    }

    #[test]
    fn test_save_after_finish_fails() {
        let mut saver = EventSaver::background(Box::new(RecordingSink::new()), 1).unwrap();
        saver.finish();
        assert!(matches!(
            saver.save(Frame::filled(2, 2, 1, 0, 1), 0),
            Err(PersistError::WorkerGone)
        ));
        assert_eq!(saver.finish(), SaveStats::default());
        assert_eq!(saver.failures(), 1);
    }

    #[test]
    fn test_background_failures_visible_before_finish() {
        let sink = RecordingSink::new();
        sink.fail_on(0);
        let mut saver = EventSaver::background(Box::new(sink), 4).unwrap();

        saver.save(Frame::filled(2, 2, 1, 0, 1), 0).unwrap();
        let mut seen = 0;
        for _ in 0..500 {
            seen = saver.failures();
            if seen == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        assert_eq!(seen, 1);
        assert_eq!(saver.stats(), SaveStats::default());
        assert_eq!(saver.finish().failed, 1);
        assert_eq!(saver.failures(), 1);
    }
}
