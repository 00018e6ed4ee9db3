//! xcast renderer - BSP-accelerated CPU raycasting.
//!
//! Casts X-ray projection rays through a triangulated specimen and collects
//! every surface crossing per ray, from which penetration length and
//! dip-angle statistics are derived. Acceleration comes from an axis-aligned
//! BSP tree (median-split or SAH) traversed with an explicit stack.

mod config;
mod engine;
mod node;
mod scene;
mod screen;
mod stats;
mod traverse;
mod tree;
mod triangle;

pub use config::{ConfigError, RenderSettings};
pub use engine::{ColorMode, Engine, Tile};
pub use node::{BspNode, NodeKind};
pub use scene::{Scene, SceneError};
pub use screen::ScreenBuffer;
pub use stats::{RayPenetration, RenderReport, TriIntersection};
pub use traverse::{sort_and_dedup_hits, Hit, TraversalStack};
pub use tree::{BspTree, TreeError};
pub use triangle::{Triangle, TriPrim, WaldTriangle};

/// Re-export common math types from xcast_math
pub use xcast_math::{Aabb, Interval, Ray, Vec3};
