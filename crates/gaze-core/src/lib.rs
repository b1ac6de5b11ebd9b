//! Core library for the gaze-rt runtime.
//!
//! This crate holds everything the runtime crates agree on without depending
//! on each other: the eye-sample data model flowing through the pipeline, the
//! render context handed to task plugins, the wire message types spoken by the
//! control plane, and the runtime error type.

pub mod context;
pub mod error;
pub mod messages;
pub mod sample;

pub use context::{pixels_per_degree, RenderContext};
pub use error::{GazeError, GazeResult};
pub use sample::{CalibrationPoint, DpiData, Eye, EyeSample, EyeTracker, GazeData, Vec2};
