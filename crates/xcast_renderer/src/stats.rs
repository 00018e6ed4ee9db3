//! Per-render statistics records.
//!
//! One [`RenderReport`] is filled per render call and reused across renders
//! to avoid reallocation churn. The optional per-ray and per-intersection
//! detail lists are populated only when the caller asks to remember data
//! (they feed downstream orientation-stability analysis).

use xcast_math::Vec3;

/// Penetration record for one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayPenetration {
    /// Pixel coordinates the ray was fired for.
    pub x: u32,
    pub y: u32,
    /// Total material thickness traversed by the ray.
    pub total_penetration: f32,
    /// Number of surface crossings after dedup.
    pub hit_count: u32,
}

/// One ray/triangle crossing retained for analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriIntersection {
    /// Stable mesh triangle index.
    pub tri: u32,
    /// |cos| of the angle between ray direction and the triangle normal.
    pub dip_cos: f32,
}

/// Aggregate statistics for one rendering from one specimen pose.
#[derive(Debug, Clone, Default)]
pub struct RenderReport {
    /// Pose this report was rendered from.
    pub rotation: Vec3,
    pub position: Vec3,

    /// Mean penetration length over rays that penetrated material.
    pub avg_penetration: f32,
    /// Mean |cos| dip angle over all surviving intersections.
    pub avg_dip_angle: f32,
    /// Longest single-ray penetration.
    pub max_penetration: f32,
    /// Fraction (0-1) of intersections at grazing incidence.
    pub bad_area_percent: f32,

    /// Per-ray detail, populated only on request.
    pub rays: Vec<RayPenetration>,
    /// Per-intersection detail, populated only on request.
    pub intersections: Vec<TriIntersection>,
}

impl RenderReport {
    /// Reset for the next render, keeping allocations.
    pub fn clear(&mut self) {
        self.rotation = Vec3::ZERO;
        self.position = Vec3::ZERO;
        self.avg_penetration = 0.0;
        self.avg_dip_angle = 0.0;
        self.max_penetration = 0.0;
        self.bad_area_percent = 0.0;
        self.rays.clear();
        self.intersections.clear();
    }
}
