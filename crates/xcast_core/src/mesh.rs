//! Mesh geometry representation for scanned specimens.
//!
//! This module provides a renderer-agnostic mesh representation that can be
//! populated from various file formats (binary STL today) and handed to the
//! raycasting scene builder.

use xcast_math::{Aabb, Vec3};

/// A mesh consisting of vertex positions, optional normals, and triangle indices.
///
/// This is the core geometry type used throughout xcast. It is intentionally
/// decoupled from any acceleration structure; the renderer derives its own
/// primitives from it.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - will be computed if not provided)
    pub normals: Option<Vec<Vec3>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Self::compute_bounds(&positions);
        Self {
            positions,
            normals,
            indices,
            bounds,
        }
    }

    /// Compute axis-aligned bounding box from positions.
    fn compute_bounds(positions: &[Vec3]) -> Aabb {
        if positions.is_empty() {
            return Aabb::empty();
        }

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for pos in positions {
            min = min.min(*pos);
            max = max.max(*pos);
        }

        Aabb::from_points(min, max)
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Get the mesh center (center of bounding box).
    pub fn center(&self) -> Vec3 {
        self.bounds.centroid()
    }

    /// Translate every vertex by `offset` and shift the cached bounds.
    ///
    /// Translation only; rotating a mesh invalidates derived primitives and
    /// requires a rebuild.
    pub fn translate(&mut self, offset: Vec3) {
        for pos in &mut self.positions {
            *pos += offset;
        }
        self.bounds = Aabb::from_points(
            Vec3::new(
                self.bounds.x.min + offset.x,
                self.bounds.y.min + offset.y,
                self.bounds.z.min + offset.z,
            ),
            Vec3::new(
                self.bounds.x.max + offset.x,
                self.bounds.y.max + offset.y,
                self.bounds.z.max + offset.z,
            ),
        );
    }

    /// Move the mesh so its bounding-box center sits at the origin.
    ///
    /// Scanned specimens arrive in scanner coordinates; the renderer rotates
    /// them around the origin, so they are centered once after load.
    pub fn center_to_origin(&mut self) -> Vec3 {
        let offset = -self.center();
        self.translate(offset);
        offset
    }

    /// Extract triangle vertices as [v0, v1, v2] triplets.
    ///
    /// Triangles with out-of-range indices are skipped with a warning.
    pub fn extract_triangle_vertices(&self) -> Vec<[Vec3; 3]> {
        let mut triangles = Vec::with_capacity(self.triangle_count());

        for chunk in self.indices.chunks(3) {
            if chunk.len() < 3 {
                continue;
            }

            let i0 = chunk[0] as usize;
            let i1 = chunk[1] as usize;
            let i2 = chunk[2] as usize;

            if i0 >= self.positions.len()
                || i1 >= self.positions.len()
                || i2 >= self.positions.len()
            {
                log::warn!(
                    "Invalid triangle indices: [{}, {}, {}], vertex count: {}",
                    i0,
                    i1,
                    i2,
                    self.positions.len()
                );
                continue;
            }

            triangles.push([self.positions[i0], self.positions[i1], self.positions[i2]]);
        }

        triangles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_creation() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let indices = vec![0, 1, 2];

        let mesh = Mesh::new(positions, indices, None);

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_bounds_computation() {
        let positions = vec![
            Vec3::new(-1.0, -2.0, -3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let indices = vec![0, 1, 2];

        let mesh = Mesh::new(positions, indices, None);

        assert!((mesh.bounds.x.min - (-1.0)).abs() < 0.001);
        assert!((mesh.bounds.x.max - 4.0).abs() < 0.001);
        assert!((mesh.bounds.y.min - (-2.0)).abs() < 0.001);
        assert!((mesh.bounds.y.max - 5.0).abs() < 0.001);
        assert!((mesh.bounds.z.min - (-3.0)).abs() < 0.001);
        assert!((mesh.bounds.z.max - 6.0).abs() < 0.001);
    }

    #[test]
    fn test_center_to_origin() {
        let positions = vec![
            Vec3::new(10.0, 10.0, 10.0),
            Vec3::new(12.0, 10.0, 10.0),
            Vec3::new(10.0, 12.0, 10.0),
        ];
        let indices = vec![0, 1, 2];

        let mut mesh = Mesh::new(positions, indices, None);
        mesh.center_to_origin();

        let center = mesh.center();
        assert!(center.length() < 0.001);
        // Vertices moved with the bounds
        assert!((mesh.positions[0] - Vec3::new(-1.0, -1.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_extract_triangle_vertices() {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        // Two triangles: [0,1,2] and [1,3,2]
        let indices = vec![0, 1, 2, 1, 3, 2];

        let mesh = Mesh::new(positions.clone(), indices, None);
        let triangles = mesh.extract_triangle_vertices();

        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[0][0], positions[0]);
        assert_eq!(triangles[1][1], positions[3]);
    }
}
