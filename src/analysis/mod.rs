//! Frame analysis: preprocessing, background statistics, foreground
//! scoring and brightness.
//!
//! All of this is pure computation over analysis samples. Nothing here
//! touches the camera, the disk or the clock.

mod background;
mod darkness;
mod foreground;
mod preprocess;

pub use background::{BackgroundModel, PixelStats};
pub use darkness::{BrightnessMetric, DarknessCheck, DarknessConfig, DarknessGovernor};
pub use foreground::{Detection, ForegroundDetector};
pub use preprocess::{PreprocessError, Preprocessor, Sample};
