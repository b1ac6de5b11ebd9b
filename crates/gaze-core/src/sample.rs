//! The eye-sample data model.
//!
//! An [`EyeSample`] is the unit that travels through the pipeline: produced by
//! a source, rewritten in place by calibration, filter and stages, and fanned
//! out to sinks. Timestamps are monotonic microseconds from the tracker and
//! are non-decreasing within a session; the runtime relies on that ordering
//! when persisting but does not enforce it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Raw dual-Purkinje tracker coordinates for one eye.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DpiData {
    pub p1: Vec2,
    pub p4: Vec2,
    pub pupil_center: Vec2,
    pub pupil_diameter: f32,
}

/// Gaze estimate for one eye: the raw projection, the filtered position and
/// the instantaneous velocity, all in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeData {
    pub raw: Vec2,
    pub filtered: Vec2,
    pub velocity: Vec2,
}

/// Everything the tracker reports for a single eye.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeTracker {
    pub dpi: DpiData,
    pub gaze: GazeData,
    pub is_valid: bool,
    pub is_blink: bool,
}

/// One binocular sample. The unit flowing through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EyeSample {
    pub left: EyeTracker,
    pub right: EyeTracker,
    /// Monotonic timestamp in microseconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

/// A correspondence between an on-screen control point and the measured
/// tracker reading, tagged per eye. Produced in batches by calibration tasks
/// and consumed by a calibration plugin to retrain its model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub control_point: Vec2,
    pub measured_point: Vec2,
    pub eye: Eye,
}
