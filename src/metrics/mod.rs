//! Status reporting and Prometheus metrics.
//!
//! The motion loop hands a [`StatusLine`] to every registered
//! [`StatusReporter`] once per cycle. Reporters never block the loop.
//!
//! # Metrics Exposed
//!
//! - `stillwatch_images_total` - Frames captured and accepted
//! - `stillwatch_event_frames_total` - Event frames handed to persistence
//! - `stillwatch_persist_failures_total` - Event frames that failed to persist
//! - `stillwatch_foreground_fraction` - Foreground fraction of the last scored frame
//! - `stillwatch_run_state` - Current run state code
//! - `stillwatch_brightness` - Last brightness measurement
//! - `stillwatch_dark` - Darkness mode flag
//! - `stillwatch_dark_sleeps_total` - Darkness sleeps performed
//!
//! With the `metrics` feature enabled, [`MetricsServer`] serves these on
//! `/metrics` and the latest status line on `/status`.

mod collector;
#[cfg(feature = "metrics")]
mod server;
mod status;

pub use collector::{MetricsError, MetricsRegistry, MetricsReporter};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
pub use status::{ChannelReporter, NullReporter, StatusLine, StatusReporter, StatusSlot};
