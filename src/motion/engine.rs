//! The motion loop state machine.
//!
//! One cycle captures a frame, tests the midpoint of the image queue
//! against the background, drains the queue to persistence when the
//! foreground fraction crosses the threshold, and lets the darkness
//! governor put the loop to sleep. Capture and analysis are strictly
//! sequential; only persistence may run on another thread.

use super::clock::{Clock, SystemClock};
use super::config::LoopConfig;
use super::queue::{ImageQueue, QueuedFrame};
use super::state::RunState;
use crate::analysis::{
    BackgroundModel, DarknessGovernor, Detection, ForegroundDetector, Preprocessor, Sample,
};
use crate::capture::{CameraError, Frame, FrameSource};
use crate::config::ConfigError;
use crate::metrics::{StatusLine, StatusReporter};
use crate::storage::{DiskSpaceGuard, EventSaver, SaveStats};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Fatal motion loop errors.
#[derive(Debug, Error)]
pub enum MotionError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The frame source kept failing after all retries.
    #[error("frame capture failed after {attempts} attempts: {source}")]
    Capture {
        /// Capture attempts made.
        attempts: u32,
        /// The last capture error.
        #[source]
        source: CameraError,
    },
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Free space fell below the configured minimum.
    DiskFull,
    /// Shutdown was requested externally.
    Shutdown,
    /// The requested number of frames was captured.
    FrameLimit,
    /// The frame source failed repeatedly.
    CaptureFailed,
}

/// A triggered event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSummary {
    /// Id of the first persisted frame.
    pub first_id: u64,
    /// Frames handed to persistence.
    pub frames: u64,
    /// Foreground fraction that triggered the event.
    pub fraction: f64,
}

/// What happened during one call to [`MotionLoop::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// State at the end of the cycle.
    pub state: RunState,
    /// Image counter at the end of the cycle.
    pub image_counter: u64,
    /// Detection result, if the midpoint was scored this cycle.
    pub detection: Option<Detection>,
    /// Event drained this cycle.
    pub event: Option<EventSummary>,
    /// Brightness measured this cycle.
    pub brightness: Option<f64>,
    /// Whether the loop slept for darkness.
    pub slept: bool,
    /// Whether the captured frame was malformed and dropped.
    pub dropped: bool,
    /// States entered during the cycle, in order.
    pub transitions: Vec<RunState>,
}

/// Totals returned by [`MotionLoop::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Frames captured and accepted.
    pub images: u64,
    /// Event frames handed to persistence.
    pub events: u64,
    /// Darkness sleeps performed.
    pub dark_sleeps: u64,
    /// Malformed frames dropped.
    pub dropped_frames: u64,
    /// Persistence outcome after the worker was joined.
    pub saves: SaveStats,
    /// Why the loop stopped.
    pub stop_reason: Option<StopReason>,
}

/// Adaptive background-subtraction capture loop.
pub struct MotionLoop<S: FrameSource> {
    config: LoopConfig,
    source: S,
    saver: EventSaver,
    preprocessor: Preprocessor,
    background: BackgroundModel,
    detector: ForegroundDetector,
    darkness: DarknessGovernor,
    queue: ImageQueue,
    state: RunState,
    image_counter: u64,
    event_counter: u64,
    dark_sleeps: u64,
    dropped_frames: u64,
    last_fraction: Option<f64>,
    last_brightness: Option<f64>,
    disk_guard: Option<Box<dyn DiskSpaceGuard>>,
    reporters: Vec<Box<dyn StatusReporter>>,
    clock: Box<dyn Clock>,
    started: DateTime<Local>,
    shutdown: Option<Arc<AtomicBool>>,
    transitions: Vec<RunState>,
    stop_reason: Option<StopReason>,
}

impl<S: FrameSource> MotionLoop<S> {
    /// Validates `config` and builds an idle loop in `Warmup`.
    pub fn new(config: LoopConfig, source: S, saver: EventSaver) -> Result<Self, ConfigError> {
        config.validate()?;

        let motion = &config.motion;
        let clock = SystemClock;
        Ok(Self {
            preprocessor: Preprocessor::new(motion.analysis_width, motion.analysis_height),
            background: BackgroundModel::new(motion.background_size),
            detector: ForegroundDetector::new(motion.sigma, motion.event_threshold),
            darkness: DarknessGovernor::new(config.darkness.clone(), motion.heartbeat),
            queue: ImageQueue::new(motion.queue_size),
            state: RunState::Warmup,
            image_counter: 0,
            event_counter: 0,
            dark_sleeps: 0,
            dropped_frames: 0,
            last_fraction: None,
            last_brightness: None,
            disk_guard: None,
            reporters: Vec::new(),
            started: clock.now(),
            clock: Box::new(clock),
            shutdown: None,
            transitions: Vec::new(),
            stop_reason: None,
            config,
            source,
            saver,
        })
    }

    /// Replaces the clock used for sleeps and running time.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.started = clock.now();
        self.clock = Box::new(clock);
        self
    }

    /// Installs the free-space check run every heartbeat.
    pub fn with_disk_guard(mut self, guard: impl DiskSpaceGuard + 'static) -> Self {
        self.disk_guard = Some(Box::new(guard));
        self
    }

    /// Adds a status reporter.
    pub fn with_reporter(mut self, reporter: impl StatusReporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    /// Stops the loop at the next cycle boundary once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Frames captured and accepted so far.
    pub fn image_counter(&self) -> u64 {
        self.image_counter
    }

    /// Next event id.
    pub fn event_counter(&self) -> u64 {
        self.event_counter
    }

    /// Darkness sleeps performed so far.
    pub fn dark_sleeps(&self) -> u64 {
        self.dark_sleeps
    }

    /// Why the loop stopped, once terminated.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// The background model.
    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    /// The image queue.
    pub fn queue(&self) -> &ImageQueue {
        &self.queue
    }

    /// The frame source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The validated configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Runs until terminated, `max_frames` images were captured, or a
    /// fatal error occurs. The persistence worker is always joined before
    /// returning.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<RunSummary, MotionError> {
        let outcome = self.run_cycles(max_frames);

        if outcome.is_err() {
            self.stop_reason = Some(StopReason::CaptureFailed);
            self.transition(RunState::Terminated);
            self.report_status(Some("stopped: frame source failed".into()));
        }

        let saves = self.saver.finish();
        if self.source.is_open() {
            self.source.close();
        }
        self.report_status(Some(format!(
            "stopped: {} saved, {} failed",
            saves.saved, saves.failed
        )));
        outcome?;

        info!(
            images = self.image_counter,
            events = self.event_counter,
            saved = saves.saved,
            failed = saves.failed,
            "Motion loop finished"
        );

        Ok(RunSummary {
            images: self.image_counter,
            events: self.event_counter,
            dark_sleeps: self.dark_sleeps,
            dropped_frames: self.dropped_frames,
            saves,
            stop_reason: self.stop_reason,
        })
    }

    fn run_cycles(&mut self, max_frames: Option<u64>) -> Result<(), MotionError> {
        while self.state != RunState::Terminated {
            if let Some(limit) = max_frames {
                if self.state != RunState::Warmup && self.image_counter >= limit {
                    self.terminate(StopReason::FrameLimit, "frame limit reached");
                    break;
                }
            }
            self.step()?;
        }
        Ok(())
    }

    /// Fills the background window and seeds the image queue.
    ///
    /// Exactly `N` accepted frames are captured; the last `M` of them become
    /// the initial queue. Does nothing outside `Warmup`.
    pub fn warm_up(&mut self) -> Result<(), MotionError> {
        if self.state != RunState::Warmup {
            return Ok(());
        }
        let target = self.background.capacity();
        let seed_from = target - self.queue.capacity();
        info!(frames = target, "Warming up background model");

        while self.background.len() < target {
            if self.shutdown_requested() {
                self.terminate(StopReason::Shutdown, "shutdown requested");
                return Ok(());
            }
            if self.disk_check_due() && self.disk_exhausted() {
                self.terminate(StopReason::DiskFull, "quitting: no disk space");
                return Ok(());
            }

            let frame = self.capture_frame()?;
            let Some(sample) = self.preprocess(&frame) else {
                continue;
            };

            self.image_counter += 1;
            let index = self.background.len();
            self.background.push(sample.clone());
            if index >= seed_from {
                self.queue.push(QueuedFrame::warmed(frame, sample));
            }

            debug!(remaining = target - self.background.len(), "Warming up");
            self.report_status(Some(format!("warming up... {}", target - self.background.len())));
        }

        info!(images = self.image_counter, "Warm-up complete, monitoring");
        self.transition(RunState::Monitoring);
        Ok(())
    }

    /// Runs one cycle (or the whole warm-up, if still warming up).
    pub fn step(&mut self) -> Result<CycleReport, MotionError> {
        self.transitions.clear();
        let was_dark = self.state == RunState::DarkSleep;

        match self.state {
            RunState::Terminated => return Ok(self.cycle_report(None, None, None, false, false)),
            RunState::Warmup => {
                self.warm_up()?;
                return Ok(self.cycle_report(None, None, None, false, false));
            }
            _ => {}
        }

        if self.shutdown_requested() {
            self.terminate(StopReason::Shutdown, "shutdown requested");
            return Ok(self.cycle_report(None, None, None, false, false));
        }
        if self.disk_check_due() && self.disk_exhausted() {
            self.terminate(StopReason::DiskFull, "quitting: no disk space");
            return Ok(self.cycle_report(None, None, None, false, false));
        }

        let frame = self.capture_frame()?;
        let Some(sample) = self.preprocess(&frame) else {
            self.report_status(Some("dropped malformed frame".into()));
            return Ok(self.cycle_report(None, None, None, false, true));
        };
        self.image_counter += 1;
        self.queue.push(QueuedFrame::new(frame, sample));

        // Score the midpoint, unless it was already scored on an earlier
        // cycle (warm-up frames, or the queue refilling after a drain).
        let mut detection = None;
        let mut current: Option<Sample> = None;
        if let Some(mid) = self.queue.midpoint_mut() {
            current = Some(mid.sample.clone());
            if !mid.scored {
                mid.scored = true;
                detection = Some(self.detector.detect(&self.background, &mid.sample));
            }
        }

        let mut event = None;
        if let Some(d) = detection {
            self.last_fraction = Some(d.fraction);
            trace!(image = self.image_counter, fraction = d.fraction, "Foreground scored");
            if d.triggered {
                event = Some(self.drain_event(d.fraction));
            }
        }

        // Darkness is checked after any drain has completed.
        let mut brightness = None;
        let mut slept = false;
        if let Some(sample) = current.as_ref() {
            if self.darkness.is_due(self.image_counter) {
                let check = self.darkness.evaluate(sample);
                self.last_brightness = Some(check.brightness);
                brightness = Some(check.brightness);
                if check.dark {
                    self.dark_sleep(check.brightness);
                    slept = true;
                } else if was_dark {
                    info!(brightness = check.brightness, "Light is back, monitoring");
                    if self.state != RunState::Monitoring {
                        self.transition(RunState::Monitoring);
                    }
                }
            }
        }

        // On a trigger the drain already backfilled the midpoint.
        if detection.is_some() && event.is_none() {
            if let Some(mid) = self.queue.midpoint_mut() {
                if !mid.in_background {
                    self.background.push(mid.sample.clone());
                    mid.in_background = true;
                }
            }
        }

        self.report_status(None);
        Ok(self.cycle_report(detection, event, brightness, slept, false))
    }

    /// Persists every queued frame, oldest first, and backfills the
    /// background with samples that had not reached it yet.
    fn drain_event(&mut self, fraction: f64) -> EventSummary {
        self.transition(RunState::EventCapture);

        let first_id = self.event_counter;
        info!(
            fraction,
            frames = self.queue.len(),
            first_event = first_id,
            "Motion detected, saving event"
        );

        while let Some(entry) = self.queue.pop_oldest() {
            let QueuedFrame {
                frame,
                sample,
                in_background,
                ..
            } = entry;

            let event_id = self.event_counter;
            self.event_counter += 1;
            self.persist(frame, event_id);

            if !in_background {
                self.background.push(sample);
            }
        }

        self.transition(RunState::Monitoring);
        EventSummary {
            first_id,
            frames: self.event_counter - first_id,
            fraction,
        }
    }

    fn persist(&mut self, frame: Frame, event_id: u64) {
        let taken = frame.timestamp();
        debug!(
            event = event_id,
            taken = %taken.format("%x %X"),
            "Handing event frame to persistence"
        );
        if let Err(e) = self.saver.save(frame, event_id) {
            warn!(event = event_id, error = %e, "Failed to persist event frame, skipping");
        }
    }

    /// Sleeps once. The loop stays in `DarkSleep` until a later check
    /// finds light again.
    fn dark_sleep(&mut self, brightness: f64) {
        if self.state != RunState::DarkSleep {
            self.transition(RunState::DarkSleep);
        }
        self.dark_sleeps += 1;

        let duration = self.darkness.sleep_duration();
        self.report_status(Some(format!(
            "sleeping (too dark, light level {:.1})",
            brightness
        )));
        info!(
            brightness,
            seconds = duration.as_secs(),
            "Too dark, sleeping"
        );

        if self.darkness.power_down() && self.source.is_open() {
            self.source.close();
        }
        // The source is re-opened lazily by the next capture.
        self.clock.sleep(duration);
    }

    fn capture_frame(&mut self) -> Result<Frame, MotionError> {
        let retries = self.config.motion.capture_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_capture() {
                Ok(frame) => return Ok(frame),
                Err(e) if attempt <= retries => {
                    warn!(attempt, error = %e, "Frame capture failed, retrying");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Frame capture failed, giving up");
                    return Err(MotionError::Capture {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    fn try_capture(&mut self) -> Result<Frame, CameraError> {
        if !self.source.is_open() {
            self.source.open(&self.config.capture)?;
        }
        self.source.capture()
    }

    fn preprocess(&mut self, frame: &Frame) -> Option<Sample> {
        match self.preprocessor.process(frame) {
            Ok(sample) => Some(sample),
            Err(e) => {
                self.dropped_frames += 1;
                warn!(error = %e, "Dropping malformed frame");
                None
            }
        }
    }

    fn disk_check_due(&self) -> bool {
        self.image_counter % self.config.motion.heartbeat == 0
    }

    fn disk_exhausted(&self) -> bool {
        let Some(guard) = &self.disk_guard else {
            return false;
        };
        match guard.free_space_gb() {
            Ok(gb) if gb < self.config.motion.min_free_gb => {
                warn!(
                    free_gb = gb,
                    min_gb = self.config.motion.min_free_gb,
                    "Insufficient disk space"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Free space check failed");
                false
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn terminate(&mut self, reason: StopReason, note: &str) {
        self.stop_reason = Some(reason);
        self.transition(RunState::Terminated);
        warn!(?reason, "Motion loop terminating");
        self.report_status(Some(note.to_string()));
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "State transition");
        }
        self.state = next;
        self.transitions.push(next);
    }

    fn status_line(&self, note: Option<String>) -> StatusLine {
        let running = (self.clock.now() - self.started).to_std().unwrap_or_default();
        StatusLine {
            running,
            images: self.image_counter,
            events: self.event_counter,
            state: self.state,
            fraction: self.last_fraction,
            brightness: self.last_brightness,
            dark: self.darkness.is_dark(),
            dark_sleeps: self.dark_sleeps,
            persist_failures: self.saver.failures(),
            note,
        }
    }

    fn report_status(&self, note: Option<String>) {
        if self.reporters.is_empty() {
            return;
        }
        let line = self.status_line(note);
        for reporter in &self.reporters {
            reporter.report(&line);
        }
    }

    fn cycle_report(
        &self,
        detection: Option<Detection>,
        event: Option<EventSummary>,
        brightness: Option<f64>,
        slept: bool,
        dropped: bool,
    ) -> CycleReport {
        CycleReport {
            state: self.state,
            image_counter: self.image_counter,
            detection,
            event,
            brightness,
            slept,
            dropped,
            transitions: self.transitions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DarknessConfig;
    use crate::capture::{CaptureConfig, ScriptStep, ScriptedCamera};
    use crate::motion::{ManualClock, MotionConfig};
    use crate::storage::{FixedDiskSpace, RecordingSink};

    const W: u32 = 8;
    const H: u32 = 6;

    fn config(n: usize, m: usize) -> LoopConfig {
        LoopConfig {
            capture: CaptureConfig {
                width: W,
                height: H,
                channels: 1,
                ..Default::default()
            },
            motion: MotionConfig {
                background_size: n,
                queue_size: m,
                heartbeat: 1000,
                analysis_width: 4,
                analysis_height: 3,
                ..Default::default()
            },
            darkness: DarknessConfig {
                sleep_secs: 600,
                ..Default::default()
            },
        }
    }

    fn build(
        n: usize,
        m: usize,
        values: &[u8],
    ) -> (MotionLoop<ScriptedCamera>, RecordingSink) {
        let sink = RecordingSink::new();
        let camera = ScriptedCamera::from_values(W, H, 1, values);
        let lp = MotionLoop::new(config(n, m), camera, EventSaver::blocking(Box::new(sink.clone())))
            .unwrap();
        (lp, sink)
    }

    fn background_values(lp: &MotionLoop<ScriptedCamera>) -> Vec<f32> {
        lp.background().iter().map(|s| s.data()[0]).collect()
    }

    #[test]
    fn test_invalid_config_fails_before_warmup() {
        let camera = ScriptedCamera::new();
        let result = MotionLoop::new(
            config(5, 2),
            camera,
            EventSaver::blocking(Box::new(RecordingSink::new())),
        );
        assert!(matches!(result, Err(ConfigError::InvalidQueueSize(2))));
    }

    #[test]
    fn test_warmup_fills_background_and_queue() {
        let (mut lp, _) = build(5, 3, &[10, 20, 30, 40, 50]);

        let report = lp.step().unwrap();

        assert_eq!(report.state, RunState::Monitoring);
        assert_eq!(lp.image_counter(), 5);
        assert_eq!(background_values(&lp), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let queued: Vec<u64> = lp.queue().iter().map(|e| e.frame.sequence()).collect();
        assert_eq!(queued, vec![3, 4, 5]);
        assert!(lp.queue().iter().all(|e| e.in_background && e.scored));
    }

    #[test]
    fn test_warmup_skips_malformed_frames() {
        let mut camera = ScriptedCamera::from_values(W, H, 1, &[100, 100]);
        camera.push(ScriptStep::Frame(Frame::new(vec![0; 3], W, H, 1, 99)));
        camera.push_value(W, H, 1, 100);
        let mut lp = MotionLoop::new(
            config(3, 1),
            camera,
            EventSaver::blocking(Box::new(RecordingSink::new())),
        )
        .unwrap();

        lp.warm_up().unwrap();

        assert_eq!(lp.state(), RunState::Monitoring);
        assert_eq!(lp.image_counter(), 3);
        assert_eq!(lp.background().len(), 3);
    }

    #[test]
    fn test_steady_scene_never_triggers() {
        let (mut lp, sink) = build(5, 3, &[100; 12]);
        lp.warm_up().unwrap();

        for _ in 0..7 {
            let report = lp.step().unwrap();
            assert!(report.event.is_none());
            if let Some(d) = report.detection {
                assert_eq!(d.fraction, 0.0);
            }
        }
        assert!(sink.saved().is_empty());
        assert_eq!(lp.background().len(), 5);
    }

    #[test]
    fn test_shifted_frame_triggers_on_the_cycle_it_is_scored() {
        let (mut lp, _) = build(4, 1, &[100, 100, 100, 100, 200]);
        lp.warm_up().unwrap();

        let report = lp.step().unwrap();

        let detection = report.detection.unwrap();
        assert!(detection.fraction > 0.0025);
        assert!(detection.triggered);
        assert_eq!(
            report.transitions,
            vec![RunState::EventCapture, RunState::Monitoring]
        );
        assert_eq!(report.event.unwrap().frames, 1);
    }

    #[test]
    fn test_backfill_pushes_each_sample_once() {
        let mut values = vec![100; 10];
        values.extend([200, 100, 100]);
        let (mut lp, sink) = build(8, 3, &values);
        lp.warm_up().unwrap();

        // 9: midpoint is a warm-up frame, 10: scores 9, 11: scores 10.
        for _ in 0..3 {
            assert!(lp.step().unwrap().event.is_none());
        }
        let report = lp.step().unwrap();
        let event = report.event.unwrap();
        assert_eq!(event.first_id, 0);
        assert_eq!(event.frames, 3);

        let saved: Vec<(u64, u64)> = sink
            .saved()
            .iter()
            .map(|s| (s.event_id, s.sequence))
            .collect();
        assert_eq!(saved, vec![(0, 10), (1, 11), (2, 12)]);

        // Pushes: 8 warm-up, 9, 10, then 11 and 12 from the drain.
        assert_eq!(
            background_values(&lp),
            vec![100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 200.0, 100.0]
        );
        assert!(lp.queue().is_empty());

        // The refilling queue scores its newest frame, which is pushed once.
        let next = lp.step().unwrap();
        assert!(!next.detection.unwrap().triggered);
        assert_eq!(
            background_values(&lp),
            vec![100.0, 100.0, 100.0, 100.0, 100.0, 200.0, 100.0, 100.0]
        );
    }

    #[test]
    fn test_capture_retry_then_success() {
        let mut camera = ScriptedCamera::from_values(W, H, 1, &[100, 100, 100]);
        camera.push(ScriptStep::Fail("glitch".into()));
        camera.push_value(W, H, 1, 100);
        let mut lp = MotionLoop::new(
            config(3, 1),
            camera,
            EventSaver::blocking(Box::new(RecordingSink::new())),
        )
        .unwrap();
        lp.warm_up().unwrap();

        let report = lp.step().unwrap();

        assert_eq!(report.image_counter, 4);
        assert_eq!(lp.source().capture_calls(), 5);
    }

    #[test]
    fn test_repeated_capture_failure_is_fatal() {
        let mut camera = ScriptedCamera::from_values(W, H, 1, &[100, 100, 100]);
        camera.push(ScriptStep::Fail("one".into()));
        camera.push(ScriptStep::Fail("two".into()));
        camera.push_value(W, H, 1, 100);
        let mut lp = MotionLoop::new(
            config(3, 1),
            camera,
            EventSaver::blocking(Box::new(RecordingSink::new())),
        )
        .unwrap();

        let result = lp.run(None);

        assert!(matches!(
            result,
            Err(MotionError::Capture { attempts: 2, .. })
        ));
        assert_eq!(lp.state(), RunState::Terminated);
        assert_eq!(lp.stop_reason(), Some(StopReason::CaptureFailed));
        assert_eq!(lp.source().remaining(), 1);
    }

    #[test]
    fn test_malformed_frame_dropped_without_counting() {
        let mut camera = ScriptedCamera::from_values(W, H, 1, &[100, 100, 100]);
        camera.push(ScriptStep::Frame(Frame::new(vec![1, 2], W, H, 1, 4)));
        let mut lp = MotionLoop::new(
            config(3, 1),
            camera,
            EventSaver::blocking(Box::new(RecordingSink::new())),
        )
        .unwrap();
        lp.warm_up().unwrap();

        let report = lp.step().unwrap();

        assert!(report.dropped);
        assert_eq!(lp.image_counter(), 3);
        assert_eq!(lp.queue().len(), 1);
        assert_eq!(lp.background().len(), 3);
    }

    #[test]
    fn test_disk_guard_checked_on_heartbeat() {
        let (lp, _) = build(3, 1, &[100; 10]);
        let disk = FixedDiskSpace::new(10.0);
        let mut lp = lp.with_disk_guard(disk.clone());
        lp.warm_up().unwrap();
        assert_eq!(lp.state(), RunState::Monitoring);

        disk.set(0.1);
        // heartbeat is 1000 and the counter is 3: not due yet.
        let report = lp.step().unwrap();
        assert_eq!(report.state, RunState::Monitoring);
        assert_eq!(lp.source().capture_calls(), 4);
    }

    #[test]
    fn test_shutdown_flag_terminates() {
        let flag = Arc::new(AtomicBool::new(false));
        let (lp, _) = build(3, 1, &[100; 10]);
        let mut lp = lp.with_shutdown(flag.clone());
        lp.warm_up().unwrap();

        flag.store(true, Ordering::SeqCst);
        let summary = lp.run(None).unwrap();

        assert_eq!(summary.stop_reason, Some(StopReason::Shutdown));
        assert_eq!(summary.images, 3);
        assert_eq!(lp.state(), RunState::Terminated);
    }

    #[test]
    fn test_dark_sleep_powers_down_and_reopens() {
        let mut cfg = config(2, 1);
        cfg.motion.heartbeat = 1;
        let camera = ScriptedCamera::from_values(W, H, 1, &[100, 100, 0, 100]);
        let clock = ManualClock::default();
        let mut lp = MotionLoop::new(cfg, camera, EventSaver::blocking(Box::new(RecordingSink::new())))
            .unwrap()
            .with_clock(clock.clone());
        lp.warm_up().unwrap();

        let dark = lp.step().unwrap();
        assert!(dark.slept);
        assert!(dark.transitions.contains(&RunState::DarkSleep));
        assert_eq!(dark.state, RunState::DarkSleep);
        assert!(!lp.source().is_open());
        assert_eq!(clock.total_slept(), std::time::Duration::from_secs(600));

        let bright = lp.step().unwrap();
        assert!(!bright.slept);
        assert_eq!(bright.state, RunState::Monitoring);
        assert_eq!(bright.transitions, vec![RunState::Monitoring]);
        assert_eq!(lp.source().open_calls(), 2);
        assert_eq!(lp.source().close_calls(), 1);
    }

    #[test]
    fn test_dark_state_held_across_consecutive_dark_frames() {
        let mut cfg = config(3, 1);
        cfg.motion.heartbeat = 1;
        let camera = ScriptedCamera::from_values(W, H, 1, &[100, 100, 100, 5, 5, 5, 100]);
        let clock = ManualClock::default();
        let mut lp = MotionLoop::new(cfg, camera, EventSaver::blocking(Box::new(RecordingSink::new())))
            .unwrap()
            .with_clock(clock.clone());
        lp.warm_up().unwrap();

        let mut entries = 0;
        let mut states = Vec::new();
        for _ in 0..4 {
            let report = lp.step().unwrap();
            entries += report
                .transitions
                .iter()
                .filter(|s| **s == RunState::DarkSleep)
                .count();
            states.push(report.state);
        }

        assert_eq!(
            states,
            vec![
                RunState::DarkSleep,
                RunState::DarkSleep,
                RunState::DarkSleep,
                RunState::Monitoring
            ]
        );
        // The first dark frame and the returning light both trigger events,
        // which end in Monitoring before darkness is evaluated.
        assert_eq!(entries, 1);
        assert_eq!(lp.dark_sleeps(), 3);
        assert_eq!(clock.total_slept(), std::time::Duration::from_secs(1800));
        assert_eq!(lp.source().close_calls(), 3);
        assert_eq!(lp.source().open_calls(), 4);
    }

    /// Reports plenty of space on the first query and almost none after.
    struct ShrinkingDisk(std::sync::atomic::AtomicU32);

    impl DiskSpaceGuard for ShrinkingDisk {
        fn free_space_gb(&self) -> Result<f64, crate::storage::DiskError> {
            let calls = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(if calls == 0 { 10.0 } else { 0.1 })
        }
    }

    #[test]
    fn test_disk_guard_polled_during_warmup() {
        let mut cfg = config(6, 1);
        cfg.motion.heartbeat = 2;
        let camera = ScriptedCamera::from_values(W, H, 1, &[100; 6]);
        let mut lp = MotionLoop::new(cfg, camera, EventSaver::blocking(Box::new(RecordingSink::new())))
            .unwrap()
            .with_disk_guard(ShrinkingDisk(std::sync::atomic::AtomicU32::new(0)));

        lp.warm_up().unwrap();

        assert_eq!(lp.state(), RunState::Terminated);
        assert_eq!(lp.stop_reason(), Some(StopReason::DiskFull));
        assert_eq!(lp.source().capture_calls(), 2);
        assert_eq!(lp.background().len(), 2);
    }
}
