//! Metrics collection and registry.

use super::status::{StatusLine, StatusReporter, StatusSlot};
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registering or encoding a metric failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for the motion loop.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    // Capture metrics
    images_total: IntCounter,
    events_total: IntCounter,
    persist_failures_total: IntCounter,

    // Detector metrics
    foreground_fraction: Gauge,
    run_state: IntGauge,

    // Darkness metrics
    brightness: Gauge,
    dark: IntGauge,
    dark_sleeps_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new registry with all motion metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let images_total = IntCounter::new(
            "stillwatch_images_total",
            "Total number of frames captured and accepted",
        )?;
        let events_total = IntCounter::new(
            "stillwatch_event_frames_total",
            "Total number of event frames handed to persistence",
        )?;
        let persist_failures_total = IntCounter::new(
            "stillwatch_persist_failures_total",
            "Event frames that could not be persisted",
        )?;

        let foreground_fraction = Gauge::new(
            "stillwatch_foreground_fraction",
            "Foreground fraction of the most recently scored frame",
        )?;
        let run_state = IntGauge::new(
            "stillwatch_run_state",
            "Current run state (0=warmup, 1=monitoring, 2=event_capture, 3=dark_sleep, 4=terminated)",
        )?;

        let brightness = Gauge::new(
            "stillwatch_brightness",
            "Most recent brightness measurement",
        )?;
        let dark = IntGauge::new("stillwatch_dark", "Darkness mode (1=dark, 0=light)")?;
        let dark_sleeps_total = IntCounter::new(
            "stillwatch_dark_sleeps_total",
            "Total number of darkness sleeps",
        )?;

        registry.register(Box::new(images_total.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(persist_failures_total.clone()))?;
        registry.register(Box::new(foreground_fraction.clone()))?;
        registry.register(Box::new(run_state.clone()))?;
        registry.register(Box::new(brightness.clone()))?;
        registry.register(Box::new(dark.clone()))?;
        registry.register(Box::new(dark_sleeps_total.clone()))?;

        Ok(Self {
            registry,
            images_total,
            events_total,
            persist_failures_total,
            foreground_fraction,
            run_state,
            brightness,
            dark,
            dark_sleeps_total,
        })
    }

    /// Updates all metrics from a status line.
    pub fn update(&self, line: &StatusLine) {
        // Counters only move forward, so increment by the difference
        bump(&self.images_total, line.images);
        bump(&self.events_total, line.events);
        bump(&self.persist_failures_total, line.persist_failures);
        bump(&self.dark_sleeps_total, line.dark_sleeps);

        if let Some(fraction) = line.fraction {
            self.foreground_fraction.set(fraction);
        }
        if let Some(brightness) = line.brightness {
            self.brightness.set(brightness);
        }
        self.run_state.set(line.state.code());
        self.dark.set(if line.dark { 1 } else { 0 });
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn bump(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

/// Feeds status lines into a [`MetricsRegistry`] and a [`StatusSlot`].
#[derive(Clone)]
pub struct MetricsReporter {
    registry: MetricsRegistry,
    slot: StatusSlot,
}

impl MetricsReporter {
    /// Creates a reporter feeding `registry` and `slot`.
    pub fn new(registry: MetricsRegistry, slot: StatusSlot) -> Self {
        Self { registry, slot }
    }
}

impl StatusReporter for MetricsReporter {
    fn report(&self, line: &StatusLine) {
        self.registry.update(line);
        self.slot.publish(&line.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::RunState;
    use std::time::Duration;

    fn line() -> StatusLine {
        StatusLine {
            running: Duration::from_secs(5),
            images: 10,
            events: 3,
            state: RunState::Monitoring,
            fraction: Some(0.5),
            brightness: Some(80.0),
            dark: false,
            dark_sleeps: 1,
            persist_failures: 0,
            note: None,
        }
    }

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&line());

        let output = registry.encode().unwrap();
        assert!(output.contains("stillwatch_images_total 10"));
        assert!(output.contains("stillwatch_event_frames_total 3"));
        assert!(output.contains("stillwatch_run_state 1"));
        assert!(output.contains("stillwatch_foreground_fraction 0.5"));
        assert!(output.contains("stillwatch_dark 0"));
    }

    #[test]
    fn test_counters_never_go_backwards() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&line());

        let mut earlier = line();
        earlier.images = 4;
        registry.update(&earlier);

        assert!(registry.encode().unwrap().contains("stillwatch_images_total 10"));
    }

    #[test]
    fn test_reporter_publishes_status() {
        let registry = MetricsRegistry::new().unwrap();
        let slot = StatusSlot::new();
        let reporter = MetricsReporter::new(registry.clone(), slot.clone());

        reporter.report(&line());

        assert!(slot.latest().starts_with("time: 0:00:05 images: 10"));
        assert!(registry.encode().unwrap().contains("stillwatch_dark_sleeps_total 1"));
    }
}
