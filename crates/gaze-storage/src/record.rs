//! Fixed-layout sample records for the compound dataset.
//!
//! The record structs mirror the in-memory sample model field for field so
//! the compound member names stay stable across runs and readable from
//! h5py/MATLAB without a translation table. Keeping them separate from
//! `gaze-core` keeps the HDF5 dependency out of every other crate.

use gaze_core::{DpiData, EyeSample, EyeTracker, GazeData, Vec2};
use hdf5::H5Type;

#[derive(H5Type, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Vec2Record {
    pub x: f32,
    pub y: f32,
}

#[derive(H5Type, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct DpiRecord {
    pub p1: Vec2Record,
    pub p4: Vec2Record,
    pub pupil_center: Vec2Record,
    pub pupil_diameter: f32,
}

#[derive(H5Type, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct GazeRecord {
    pub raw: Vec2Record,
    pub filtered: Vec2Record,
    pub velocity: Vec2Record,
}

#[derive(H5Type, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct TrackerRecord {
    pub dpi: DpiRecord,
    pub gaze: GazeRecord,
    pub is_valid: bool,
    pub is_blink: bool,
}

#[derive(H5Type, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct EyeSampleRecord {
    pub left: TrackerRecord,
    pub right: TrackerRecord,
    pub timestamp: u64,
}

impl From<Vec2> for Vec2Record {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<DpiData> for DpiRecord {
    fn from(d: DpiData) -> Self {
        Self {
            p1: d.p1.into(),
            p4: d.p4.into(),
            pupil_center: d.pupil_center.into(),
            pupil_diameter: d.pupil_diameter,
        }
    }
}

impl From<GazeData> for GazeRecord {
    fn from(g: GazeData) -> Self {
        Self {
            raw: g.raw.into(),
            filtered: g.filtered.into(),
            velocity: g.velocity.into(),
        }
    }
}

impl From<EyeTracker> for TrackerRecord {
    fn from(t: EyeTracker) -> Self {
        Self {
            dpi: t.dpi.into(),
            gaze: t.gaze.into(),
            is_valid: t.is_valid,
            is_blink: t.is_blink,
        }
    }
}

impl From<EyeSample> for EyeSampleRecord {
    fn from(sample: EyeSample) -> Self {
        Self {
            left: sample.left.into(),
            right: sample.right.into(),
            timestamp: sample.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_sample_fields() {
        let mut sample = EyeSample::default();
        sample.timestamp = 42;
        sample.left.dpi.pupil_diameter = 3.5;
        sample.left.is_blink = true;
        sample.right.gaze.velocity = Vec2::new(-1.0, 2.0);

        let record = EyeSampleRecord::from(sample);
        assert_eq!(record.timestamp, 42);
        assert_eq!(record.left.dpi.pupil_diameter, 3.5);
        assert!(record.left.is_blink);
        assert_eq!(record.right.gaze.velocity, Vec2Record { x: -1.0, y: 2.0 });
    }
}
