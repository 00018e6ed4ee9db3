//! Scene: the triangle primitives and their BSP tree.
//!
//! Built once per loaded model and rebuilt when the model or the tree
//! settings change. The primitives and the tree share the model's lifetime.

use thiserror::Error;
use xcast_core::Mesh;
use xcast_math::{Aabb, Interval, Vec3};

use crate::config::RenderSettings;
use crate::node::NodeKind;
use crate::tree::{BspTree, TreeError};
use crate::triangle::TriPrim;

/// Errors from scene construction.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("mesh contains no triangles")]
    EmptyMesh,

    #[error("mesh contains only degenerate triangles")]
    DegenerateGeometry,

    #[error("tree build failed: {0}")]
    Tree(#[from] TreeError),
}

/// A renderable scene: primitives plus acceleration tree.
pub struct Scene {
    prims: Vec<TriPrim>,
    tree: BspTree,
    bounds: Aabb,
}

impl Scene {
    /// Build a scene from mesh geometry.
    ///
    /// One primitive is created per mesh triangle; degenerate triangles are
    /// skipped with a warning (their stable indices are simply absent from
    /// the tree). The tree depth comes from the settings' model-complexity
    /// tiers.
    pub fn from_mesh(mesh: &Mesh, settings: &RenderSettings) -> Result<Self, SceneError> {
        let triangles = mesh.extract_triangle_vertices();
        if triangles.is_empty() {
            return Err(SceneError::EmptyMesh);
        }

        let mut prims = Vec::with_capacity(triangles.len());
        let mut skipped = 0usize;
        for (i, [v0, v1, v2]) in triangles.iter().enumerate() {
            match TriPrim::new(*v0, *v1, *v2, i as u32) {
                Some(prim) => prims.push(prim),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("Skipped {} degenerate triangles", skipped);
        }
        if prims.is_empty() {
            return Err(SceneError::DegenerateGeometry);
        }

        let bounds = mesh.bounds;
        let split_level = settings.split_level_for(prims.len());
        let tree = BspTree::build(
            &prims,
            bounds,
            split_level,
            settings.min_tri_per_node,
            settings.use_sah,
        )?;

        log::info!(
            "Scene ready: {} primitives, tree depth {}",
            prims.len(),
            tree.depth()
        );

        Ok(Self {
            prims,
            tree,
            bounds,
        })
    }

    pub fn prims(&self) -> &[TriPrim] {
        &self.prims
    }

    pub fn tree(&self) -> &BspTree {
        &self.tree
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.prims.len()
    }

    /// Translate the whole scene without rebuilding the tree.
    ///
    /// Valid for translation only: primitives recompute their plane terms
    /// and the tree's split coordinates shift with the geometry. A rotation
    /// requires a rebuild from the rotated mesh.
    pub fn translate(&mut self, offset: Vec3) {
        for prim in &mut self.prims {
            prim.translate(offset);
        }
        for node in &mut self.tree.nodes {
            if let NodeKind::Internal { axis, split, .. } = &mut node.kind {
                *split += offset[*axis as usize];
            }
        }

        let shift = |iv: Interval, d: f32| Interval::new(iv.min + d, iv.max + d);
        self.bounds = Aabb::new(
            shift(self.bounds.x, offset.x),
            shift(self.bounds.y, offset.y),
            shift(self.bounds.z, offset.z),
        );
        self.tree.bounds = self.bounds;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::traverse::{sort_and_dedup_hits, TraversalStack};
    use xcast_math::Ray;

    /// Unit cube [0,1]^3 as an indexed mesh.
    pub(crate) fn unit_cube_mesh() -> Mesh {
        let p = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        let positions = vec![
            p(0.0, 0.0, 0.0),
            p(1.0, 0.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0),
            p(1.0, 0.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(0.0, 1.0, 1.0),
        ];
        let indices = vec![
            0, 2, 1, 0, 3, 2, // z = 0
            4, 5, 6, 4, 6, 7, // z = 1
            0, 1, 5, 0, 5, 4, // y = 0
            3, 6, 2, 3, 7, 6, // y = 1
            0, 4, 7, 0, 7, 3, // x = 0
            1, 2, 6, 1, 6, 5, // x = 1
        ];
        Mesh::new(positions, indices, None)
    }

    fn test_settings() -> RenderSettings {
        RenderSettings {
            min_tri_per_node: 1,
            tree_level1: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_mesh_builds_all_prims() {
        let scene = Scene::from_mesh(&unit_cube_mesh(), &test_settings()).unwrap();
        assert_eq!(scene.triangle_count(), 12);
        assert_eq!(scene.tree().split_level(), 4);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mesh = Mesh::new(vec![], vec![], None);
        assert!(matches!(
            Scene::from_mesh(&mesh, &test_settings()),
            Err(SceneError::EmptyMesh)
        ));
    }

    #[test]
    fn test_degenerate_triangles_skipped() {
        // One real triangle and one collinear sliver
        let positions = vec![
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let indices = vec![0, 1, 2, 0, 1, 3];
        let mesh = Mesh::new(positions, indices, None);

        let scene = Scene::from_mesh(&mesh, &test_settings()).unwrap();
        assert_eq!(scene.triangle_count(), 1);
        // The surviving primitive keeps its stable mesh index
        assert_eq!(scene.prims()[0].index, 0);
    }

    #[test]
    fn test_all_degenerate_rejected() {
        let positions = vec![
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let indices = vec![0, 1, 2];
        let mesh = Mesh::new(positions, indices, None);

        assert!(matches!(
            Scene::from_mesh(&mesh, &test_settings()),
            Err(SceneError::DegenerateGeometry)
        ));
    }

    #[test]
    fn test_translate_keeps_tree_consistent() {
        let mut scene = Scene::from_mesh(&unit_cube_mesh(), &test_settings()).unwrap();
        let offset = Vec3::new(5.0, -2.0, 1.5);
        scene.translate(offset);

        // A ray aimed at the moved cube still finds entry and exit
        let ray = Ray::new(
            Vec3::new(4.0, -1.7, 2.1), // 0.3/0.6 in cube-local coordinates
            Vec3::new(1.0, 0.0, 0.0),
        );
        let mut stack = TraversalStack::for_tree(scene.tree());
        let mut hits = Vec::new();
        scene
            .tree()
            .intersect_all(&ray, scene.prims(), 1e-5, &mut stack, &mut hits);
        sort_and_dedup_hits(&mut hits);

        assert_eq!(hits.len(), 2);
        assert!((hits[0].dist - 1.0).abs() < 1e-4);
        assert!((hits[1].dist - 2.0).abs() < 1e-4);
    }
}
