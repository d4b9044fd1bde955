//! Stillwatch: an unattended camera appliance with adaptive motion capture.
//!
//! Frames are captured continuously and reduced to small analysis samples.
//! A rolling per-pixel background (mean and standard deviation over the
//! last `N` samples) decides whether the midpoint of a short image queue
//! differs from the scene; when enough pixels do, the whole queue is
//! persisted so every event comes with frames from before and after the
//! trigger. When the scene is too dark the loop sleeps, optionally
//! powering the camera down.
//!
//! # Architecture
//!
//! ```text
//! capture → analysis (preprocess → background/foreground, darkness)
//!              ↓
//!           motion loop → storage (event saver → sink)
//!              ↓
//!           metrics (status lines, Prometheus)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stillwatch::{
//!     capture::SyntheticCamera,
//!     motion::{LoopConfig, MotionLoop},
//!     storage::{EventSaver, FsSink, StorageConfig},
//! };
//!
//! let sink = FsSink::new(&StorageConfig::default()).unwrap();
//! let saver = EventSaver::blocking(Box::new(sink));
//! let camera = SyntheticCamera::new(100).with_intrusion(90, 250);
//!
//! let mut motion = MotionLoop::new(LoopConfig::default(), camera, saver).unwrap();
//! let summary = motion.run(Some(120)).unwrap();
//! println!("{} event frames", summary.events);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod capture;
pub mod config;
pub mod metrics;
pub mod motion;
pub mod storage;

// Re-export commonly used types at crate root
pub use analysis::{BackgroundModel, DarknessGovernor, ForegroundDetector, Preprocessor, Sample};
pub use capture::{CaptureConfig, Frame, FrameSource, SyntheticCamera};
pub use config::{ConfigError, FileConfig};
pub use motion::{LoopConfig, MotionConfig, MotionError, MotionLoop, RunState};
pub use storage::{EventSaver, FsSink, PersistenceSink, StorageConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
