//! Render context published to task plugins.

use serde::{Deserialize, Serialize};

/// Geometry of the active display, computed once when graphics settings are
/// applied and handed to every task plugin before its first frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    /// Distance from the participant's eyes to the screen.
    pub view_distance_mm: u32,
    /// Physical width of the selected monitor.
    pub screen_width_mm: u32,
    /// Physical height of the selected monitor.
    pub screen_height_mm: u32,
    /// Pixels per degree of visual angle along x.
    pub ppd_x: f32,
    /// Pixels per degree of visual angle along y.
    pub ppd_y: f32,
}

/// Pixels per degree of visual angle for one screen axis.
///
/// Uses the full screen extent rather than the small-angle approximation so
/// the value stays honest for close viewing distances.
pub fn pixels_per_degree(resolution_px: i32, physical_mm: u32, view_distance_mm: u32) -> f32 {
    if physical_mm == 0 || view_distance_mm == 0 {
        return 0.0;
    }
    let half = physical_mm as f64 / 2.0;
    let angle_deg = 2.0 * (half / view_distance_mm as f64).atan().to_degrees();
    (resolution_px as f64 / angle_deg) as f32
}
