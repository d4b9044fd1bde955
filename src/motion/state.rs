//! Run states of the motion loop.

use serde::Serialize;
use std::fmt;

/// The single active state of the motion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Filling the background window and image queue.
    Warmup,
    /// Capturing and testing frames.
    Monitoring,
    /// Draining the image queue to persistence.
    EventCapture,
    /// The scene is too dark. Held across cycles, sleeping on each
    /// re-check, until a check finds light.
    DarkSleep,
    /// Stopped for good.
    Terminated,
}

impl RunState {
    /// Numeric code exported as a gauge.
    pub fn code(self) -> i64 {
        match self {
            RunState::Warmup => 0,
            RunState::Monitoring => 1,
            RunState::EventCapture => 2,
            RunState::DarkSleep => 3,
            RunState::Terminated => 4,
        }
    }

    /// Lower-case name used in logs and status lines.
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Warmup => "warmup",
            RunState::Monitoring => "monitoring",
            RunState::EventCapture => "event_capture",
            RunState::DarkSleep => "dark_sleep",
            RunState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
