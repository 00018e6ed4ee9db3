//! xcast core - specimen geometry and mesh file loading.
//!
//! This crate provides:
//!
//! - **Mesh**: indexed triangle geometry with cached bounds
//! - **STL support**: binary STL specimen loading
//!
//! # Example
//!
//! ```ignore
//! use xcast_core::stl::load_stl;
//!
//! let mut mesh = load_stl("specimen.stl")?;
//! mesh.center_to_origin();
//! println!("Loaded {} triangles", mesh.triangle_count());
//! ```

pub mod mesh;
pub mod stl;

// Re-export commonly used types
pub use mesh::Mesh;
pub use stl::{load_stl, StlError};
