//! Event persistence and disk-space supervision.
//!
//! Event frames leave the motion loop through an `EventSaver`, which owns
//! a `PersistenceSink` and decides whether writes happen inline or on a
//! worker thread. `DiskSpaceGuard` implementations tell the loop when to
//! stop before the card fills up.

mod config;
mod disk;
mod saver;
mod sink;

pub use config::{SavePolicy, StorageConfig};
pub use disk::{DiskError, DiskSpaceGuard, FixedDiskSpace, StatvfsGuard};
pub use saver::{EventSaver, SaveStats};
pub use sink::{event_file_name, FsSink, PersistError, PersistenceSink, RecordingSink, SavedFrame};
