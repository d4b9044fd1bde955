//! The motion-detection loop.
//!
//! `MotionLoop` owns the frame source, the background model, the image
//! queue and the darkness governor, and walks through the [`RunState`]s:
//!
//! ```text
//! Warmup → Monitoring ⇄ EventCapture
//!              ⇅
//!          DarkSleep        (any) → Terminated
//! ```
//!
//! An event drained while dark ends in `Monitoring`; the darkness check
//! that follows puts the loop back to sleep if the scene is still dark.

mod clock;
mod config;
mod engine;
mod queue;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LoopConfig, MotionConfig};
pub use engine::{CycleReport, EventSummary, MotionError, MotionLoop, RunSummary, StopReason};
pub use queue::{ImageQueue, QueuedFrame};
pub use state::RunState;
