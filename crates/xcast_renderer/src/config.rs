//! Render settings.
//!
//! One explicit configuration value passed by reference into the scene
//! builder and the engine. Nothing in this crate reads global state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tunable constants for tree construction and rendering.
///
/// Read-only for the duration of a render; mutate only between renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Maximum ray recursion depth accepted by the per-ray routine.
    pub trace_depth: u32,

    /// Tile grid dimensions; one render task per tile.
    pub thread_grid_x: u32,
    pub thread_grid_y: u32,

    /// A tree node with at most this many primitives becomes a leaf.
    pub min_tri_per_node: usize,

    /// Use the surface-area-heuristic builder instead of median splits.
    /// O(n^2) per node; expect slow builds on large meshes.
    pub use_sah: bool,

    /// Tree depth tiers keyed on model complexity, see [`split_level_for`].
    ///
    /// [`split_level_for`]: RenderSettings::split_level_for
    pub tree_level1: u32,
    pub tree_level2: u32,
    pub tree_level3: u32,

    /// Triangle-count thresholds separating the three depth tiers.
    pub tree_split1: usize,
    pub tree_split2: usize,

    /// Rays per dispatch batch. Consumed only by GPU backends; retained so
    /// settings files stay portable across render paths.
    pub batch_size: u32,

    /// Numeric guard for near-zero direction components and intersection
    /// distance cutoffs.
    pub epsilon: f32,

    /// Z coordinate of the X-ray source point (world space, unrotated).
    pub source_z: f32,

    /// Detector plane geometry: plane at `plane_z`, extending
    /// `plane_half_width/height` from the Z axis.
    pub plane_z: f32,
    pub plane_half_width: f32,
    pub plane_half_height: f32,

    /// Grayscale scale factor applied to accumulated penetration length.
    pub coloring_coef: f32,

    /// Penetration length mapped to full white; longer paths clamp.
    pub max_penetration: f32,

    /// Color endpoints (RGB 0-255) for dip-angle false coloring.
    pub color_near: [u8; 3],
    pub color_far: [u8; 3],

    /// |cos| threshold below which an intersection counts as bad surface
    /// (grazing incidence).
    pub bad_angle_cos: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            trace_depth: 2,
            thread_grid_x: 4,
            thread_grid_y: 4,
            min_tri_per_node: 20,
            use_sah: false,
            tree_level1: 8,
            tree_level2: 10,
            tree_level3: 12,
            tree_split1: 10_000,
            tree_split2: 100_000,
            batch_size: 100,
            epsilon: 1e-5,
            source_z: -10.0,
            plane_z: 10.0,
            plane_half_width: 2.0,
            plane_half_height: 2.0,
            coloring_coef: 1.0,
            max_penetration: 10.0,
            color_near: [255, 255, 255],
            color_far: [255, 0, 0],
            bad_angle_cos: 0.2,
        }
    }
}

impl RenderSettings {
    /// Load settings from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let settings: RenderSettings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants the tree builder and engine rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_level1 == 0 || self.tree_level2 == 0 || self.tree_level3 == 0 {
            return Err(ConfigError::Invalid("tree split level must be >= 1".into()));
        }
        if self.thread_grid_x == 0 || self.thread_grid_y == 0 {
            return Err(ConfigError::Invalid("thread grid must be >= 1x1".into()));
        }
        if self.epsilon <= 0.0 {
            return Err(ConfigError::Invalid("epsilon must be positive".into()));
        }
        if self.plane_half_width <= 0.0 || self.plane_half_height <= 0.0 {
            return Err(ConfigError::Invalid(
                "detector plane extents must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Pick a tree depth for a model of the given complexity.
    ///
    /// Small models get `tree_level1`, models past `tree_split1` triangles
    /// get `tree_level2`, and models past `tree_split2` get `tree_level3`.
    pub fn split_level_for(&self, triangle_count: usize) -> u32 {
        if triangle_count > self.tree_split2 {
            self.tree_level3
        } else if triangle_count > self.tree_split1 {
            self.tree_level2
        } else {
            self.tree_level1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = RenderSettings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_split_level_tiers() {
        let settings = RenderSettings {
            tree_level1: 6,
            tree_level2: 9,
            tree_level3: 12,
            tree_split1: 100,
            tree_split2: 1000,
            ..Default::default()
        };

        assert_eq!(settings.split_level_for(50), 6);
        assert_eq!(settings.split_level_for(100), 6);
        assert_eq!(settings.split_level_for(101), 9);
        assert_eq!(settings.split_level_for(1001), 12);
    }

    #[test]
    fn test_validate_rejects_zero_grid() {
        let settings = RenderSettings {
            thread_grid_x: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let settings = RenderSettings {
            use_sah: true,
            thread_grid_x: 2,
            color_far: [10, 20, 30],
            ..Default::default()
        };

        let json = serde_json::to_string(&settings).unwrap();
        let back: RenderSettings = serde_json::from_str(&json).unwrap();

        assert!(back.use_sah);
        assert_eq!(back.thread_grid_x, 2);
        assert_eq!(back.color_far, [10, 20, 30]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let back: RenderSettings = serde_json::from_str(r#"{"use_sah": true}"#).unwrap();
        assert!(back.use_sah);
        assert_eq!(back.thread_grid_x, RenderSettings::default().thread_grid_x);
    }
}
