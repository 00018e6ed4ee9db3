//! Non-recursive BSP tree traversal.
//!
//! An explicit stack bounds traversal depth deterministically and avoids
//! call overhead in the per-ray hot path. The query collects EVERY
//! ray/triangle intersection; straddling triangles duplicated across leaves
//! produce duplicate hits here, which the shading pass collapses after
//! sorting by distance.

use xcast_math::Ray;

use crate::node::NodeKind;
use crate::tree::BspTree;
use crate::triangle::TriPrim;

/// One ray/triangle intersection: primitive id plus hit distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub tri: u32,
    pub dist: f32,
}

#[derive(Debug, Clone, Copy)]
struct StackFrame {
    node: u32,
    tmin: f32,
    tmax: f32,
}

/// Reusable traversal stack.
///
/// Allocated once per worker and reused across rays so the hot path never
/// allocates. Capacity follows the tree depth.
pub struct TraversalStack {
    frames: Vec<StackFrame>,
}

impl TraversalStack {
    /// Stack sized for `tree` (depth + 1 frames before any growth).
    pub fn for_tree(tree: &BspTree) -> Self {
        Self {
            frames: Vec::with_capacity(tree.depth() as usize + 1),
        }
    }
}

impl BspTree {
    /// Collect every intersection of `ray` with the tree's primitives.
    ///
    /// Returns false when the ray misses the root bounds entirely (zero
    /// intersections, not an error). Hits are traversal-ordered, not
    /// distance-ordered; see [`sort_and_dedup_hits`].
    pub fn intersect_all(
        &self,
        ray: &Ray,
        prims: &[TriPrim],
        epsilon: f32,
        stack: &mut TraversalStack,
        out: &mut Vec<Hit>,
    ) -> bool {
        out.clear();

        let (root_tmin, root_tmax) = match self.bounds().hit_range(ray) {
            Some(range) => range,
            None => return false,
        };

        stack.frames.clear();
        stack.frames.push(StackFrame {
            node: 0,
            tmin: root_tmin,
            tmax: root_tmax,
        });

        while let Some(frame) = stack.frames.pop() {
            match self.nodes[frame.node as usize].kind {
                NodeKind::Leaf { start, count } => {
                    for i in start..start + count {
                        let prim_id = self.tri_index[i as usize];
                        let prim = &prims[prim_id as usize];
                        if let Some(dist) = prim.intersect(ray, epsilon, f32::INFINITY, epsilon)
                        {
                            out.push(Hit { tri: prim_id, dist });
                        }
                    }
                }
                NodeKind::Internal {
                    axis,
                    split,
                    left,
                    right,
                } => {
                    let axis = axis as usize;

                    // Guard a zero direction component before dividing
                    let mut dir = ray.direction[axis];
                    if dir.abs() < epsilon {
                        dir = if dir < 0.0 { -epsilon } else { epsilon };
                    }
                    let t_split = (split - ray.origin[axis]) / dir;

                    // Near child is on the ray origin's side of the plane
                    let (near, far) = if ray.direction[axis] >= 0.0 {
                        (left, right)
                    } else {
                        (right, left)
                    };

                    if t_split > frame.tmax {
                        // Plane beyond the current range: near side only
                        if let Some(n) = near {
                            stack.frames.push(StackFrame {
                                node: n,
                                tmin: frame.tmin,
                                tmax: frame.tmax,
                            });
                        }
                    } else if t_split < frame.tmin {
                        // Plane behind the current range: far side only
                        if let Some(f) = far {
                            stack.frames.push(StackFrame {
                                node: f,
                                tmin: frame.tmin,
                                tmax: frame.tmax,
                            });
                        }
                    } else {
                        // Range straddles the plane: both sides, near on top
                        // of the stack so it pops first
                        if let Some(f) = far {
                            stack.frames.push(StackFrame {
                                node: f,
                                tmin: t_split,
                                tmax: frame.tmax,
                            });
                        }
                        if let Some(n) = near {
                            stack.frames.push(StackFrame {
                                node: n,
                                tmin: frame.tmin,
                                tmax: t_split,
                            });
                        }
                    }
                }
            }
        }

        true
    }
}

/// Order hits by distance and drop entries referencing the same triangle as
/// their immediate predecessor.
///
/// This collapses the duplicates produced by straddling triangles, which
/// sort adjacent because their distances coincide. The dedup is
/// adjacency-based only: a triangle somehow hit twice at distinct distances
/// would survive, matching the established behavior downstream consumers
/// calibrate against.
pub fn sort_and_dedup_hits(hits: &mut Vec<Hit>) {
    hits.sort_unstable_by(|a, b| {
        a.dist
            .partial_cmp(&b.dist)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.dedup_by(|a, b| a.tri == b.tri);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::{cube_bounds, unit_cube_prims};
    use xcast_math::Vec3;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_single_triangle_completeness() {
        let prim = TriPrim::new(
            Vec3::new(-1.0, -1.0, 2.0),
            Vec3::new(1.0, -1.0, 2.0),
            Vec3::new(0.0, 1.0, 2.0),
            0,
        )
        .unwrap();
        let prims = vec![prim];
        let bounds = prim.bounds();
        let tree = BspTree::build(&prims, bounds, 4, 1, false).unwrap();

        // Ray at the centroid
        let centroid =
            (prim.triangle.v0 + prim.triangle.v1 + prim.triangle.v2) / 3.0;
        let ray = Ray::new(Vec3::new(centroid.x, centroid.y, 0.0), Vec3::new(0.0, 0.0, 1.0));

        let mut stack = TraversalStack::for_tree(&tree);
        let mut hits = Vec::new();
        assert!(tree.intersect_all(&ray, &prims, EPS, &mut stack, &mut hits));
        sort_and_dedup_hits(&mut hits);

        assert_eq!(hits.len(), 1);

        // Distance agrees with the direct primitive test
        let direct = prim.intersect(&ray, 0.0, f32::INFINITY, EPS).unwrap();
        assert!((hits[0].dist - direct).abs() < 1e-4);
        assert!((direct - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_miss_returns_false_and_empty() {
        let prims = unit_cube_prims();
        let tree = BspTree::build(&prims, cube_bounds(), 4, 1, false).unwrap();

        let ray = Ray::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(0.0, 0.0, 1.0));
        let mut stack = TraversalStack::for_tree(&tree);
        let mut hits = vec![Hit { tri: 9, dist: 9.0 }]; // stale content

        assert!(!tree.intersect_all(&ray, &prims, EPS, &mut stack, &mut hits));
        assert!(hits.is_empty());
    }

    #[test]
    fn test_cube_ray_two_surviving_hits_per_axis() {
        let prims = unit_cube_prims();
        let tree = BspTree::build(&prims, cube_bounds(), 4, 1, false).unwrap();
        let mut stack = TraversalStack::for_tree(&tree);
        let mut hits = Vec::new();

        // Through the cube interior along each principal axis, off the face
        // diagonals so each face contributes exactly one triangle.
        let rays = [
            Ray::new(Vec3::new(-1.0, 0.3, 0.6), Vec3::new(1.0, 0.0, 0.0)),
            Ray::new(Vec3::new(0.3, -1.0, 0.6), Vec3::new(0.0, 1.0, 0.0)),
            Ray::new(Vec3::new(0.3, 0.6, -1.0), Vec3::new(0.0, 0.0, 1.0)),
        ];

        for ray in rays {
            tree.intersect_all(&ray, &prims, EPS, &mut stack, &mut hits);
            sort_and_dedup_hits(&mut hits);

            assert_eq!(hits.len(), 2, "expected entry and exit for {:?}", ray);
            // Entry and exit faces are one unit apart
            assert!((hits[1].dist - hits[0].dist - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_ray_origin_inside_cube() {
        let prims = unit_cube_prims();
        let tree = BspTree::build(&prims, cube_bounds(), 4, 1, false).unwrap();
        let mut stack = TraversalStack::for_tree(&tree);
        let mut hits = Vec::new();

        let ray = Ray::new(Vec3::new(0.3, 0.4, 0.45), Vec3::new(1.0, 0.0, 0.0));
        tree.intersect_all(&ray, &prims, EPS, &mut stack, &mut hits);
        sort_and_dedup_hits(&mut hits);

        // Only the exit face is ahead of the origin
        assert_eq!(hits.len(), 1);
        assert!((hits[0].dist - 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_axis_parallel_ray_with_zero_components() {
        // Direction has exact zeros on two axes; the epsilon guard must not
        // misroute the traversal.
        let prims = unit_cube_prims();
        let tree = BspTree::build(&prims, cube_bounds(), 8, 1, false).unwrap();
        let mut stack = TraversalStack::for_tree(&tree);
        let mut hits = Vec::new();

        let ray = Ray::new(Vec3::new(0.7, 0.2, -3.0), Vec3::new(0.0, 0.0, 1.0));
        tree.intersect_all(&ray, &prims, EPS, &mut stack, &mut hits);
        sort_and_dedup_hits(&mut hits);

        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_stack_reuse_across_rays() {
        let prims = unit_cube_prims();
        let tree = BspTree::build(&prims, cube_bounds(), 4, 1, false).unwrap();
        let mut stack = TraversalStack::for_tree(&tree);
        let mut hits = Vec::new();

        for i in 0..10 {
            let y = 0.1 + 0.07 * i as f32;
            let ray = Ray::new(Vec3::new(-1.0, y, 0.6), Vec3::new(1.0, 0.0, 0.0));
            tree.intersect_all(&ray, &prims, EPS, &mut stack, &mut hits);
            sort_and_dedup_hits(&mut hits);
            assert_eq!(hits.len(), 2, "ray {} failed", i);
        }
    }

    #[test]
    fn test_sort_and_dedup_keeps_distinct_triangles() {
        let mut hits = vec![
            Hit { tri: 3, dist: 2.0 },
            Hit { tri: 1, dist: 1.0 },
            Hit { tri: 3, dist: 2.0 },
            Hit { tri: 2, dist: 3.0 },
        ];
        sort_and_dedup_hits(&mut hits);

        assert_eq!(
            hits,
            vec![
                Hit { tri: 1, dist: 1.0 },
                Hit { tri: 3, dist: 2.0 },
                Hit { tri: 2, dist: 3.0 },
            ]
        );
    }
}
