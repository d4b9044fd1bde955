//! Per-cycle status lines for viewers.
//!
//! Reporting must never stall the capture loop: every reporter either
//! completes immediately or drops the update.

use crate::motion::RunState;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One cycle's worth of status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    /// Time since the loop started.
    pub running: Duration,
    /// Frames captured and accepted.
    pub images: u64,
    /// Event frames handed to persistence.
    pub events: u64,
    /// Current run state.
    pub state: RunState,
    /// Most recent foreground fraction.
    pub fraction: Option<f64>,
    /// Most recent brightness measurement.
    pub brightness: Option<f64>,
    /// Whether darkness mode is active.
    pub dark: bool,
    /// Darkness sleeps so far.
    pub dark_sleeps: u64,
    /// Event frames that could not be persisted.
    pub persist_failures: u64,
    /// Optional free-form remark.
    pub note: Option<String>,
}

impl StatusLine {
    /// Renders the line shown by viewers, e.g.
    /// `time: 0:01:05 images: 42 events: 3 mode: monitoring fg: 0.12%`.
    pub fn render(&self) -> String {
        let secs = self.running.as_secs();
        let mut line = format!(
            "time: {}:{:02}:{:02} images: {} events: {} mode: {}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            self.images,
            self.events,
            self.state
        );
        if let Some(fraction) = self.fraction {
            line.push_str(&format!(" fg: {:.2}%", fraction * 100.0));
        }
        if let Some(note) = &self.note {
            line.push_str(" * ");
            line.push_str(note);
        }
        line
    }
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Receives status updates. Implementations must not block.
pub trait StatusReporter {
    /// Handles one status update.
    fn report(&self, line: &StatusLine);
}

/// Discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl StatusReporter for NullReporter {
    fn report(&self, _line: &StatusLine) {}
}

/// Forwards updates over a bounded channel, dropping them when full.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: Sender<StatusLine>,
    dropped: Arc<AtomicU64>,
}

impl ChannelReporter {
    /// Creates a reporter and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, Receiver<StatusLine>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Updates dropped because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl StatusReporter for ChannelReporter {
    fn report(&self, line: &StatusLine) {
        match self.tx.try_send(line.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Holds the most recent rendered status line for pull-based viewers.
#[derive(Debug, Clone, Default)]
pub struct StatusSlot {
    latest: Arc<Mutex<String>>,
}

impl StatusSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored line unless a reader currently holds it.
    pub fn publish(&self, line: &str) {
        if let Ok(mut latest) = self.latest.try_lock() {
            latest.clear();
            latest.push_str(line);
        }
    }

    /// The most recent rendered line, or an empty string.
    pub fn latest(&self) -> String {
        self.latest.lock().map(|l| l.clone()).unwrap_or_default()
    }
}
