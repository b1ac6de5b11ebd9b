//! HDF5 session persistence.
//!
//! One file per protocol run, named by the run UUID. Each task gets a group
//! `task_NNN` holding a single chunked, extensible `eye_data` dataset of
//! fixed-layout sample records appended in insertion order. A background
//! writer drains a bounded queue so pipeline latency never depends on disk
//! throughput; the queue is drained and the dataset flushed when the task
//! ends, after which the group takes no further appends.

pub mod record;
pub mod session;
pub mod writer;

pub use record::EyeSampleRecord;
pub use session::{SessionFile, SessionMetadata, TaskGroup};
pub use writer::SampleWriter;

use gaze_core::GazeError;

/// The persistence layer surfaces as I/O failures.
pub(crate) fn h5_error(err: hdf5::Error) -> GazeError {
    GazeError::Io(std::io::Error::other(err.to_string()))
}
