//! Axis-aligned BSP tree construction and persistence.
//!
//! The tree partitions triangle primitives by recursive axis-aligned splits,
//! either at the midpoint of the longest axis or at the cheapest
//! surface-area-heuristic candidate. Triangles straddling a split are
//! duplicated into both children; an empty side is pruned instead of
//! becoming an empty leaf. All nodes live in one arena vector and leaves
//! share one append-only triangle-index array.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;
use xcast_math::{Aabb, Interval};

use crate::node::{BspNode, NodeKind};
use crate::triangle::TriPrim;

/// Errors from tree construction and persistence.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated tree file")]
    Truncated,

    #[error("invalid split level {0}")]
    InvalidSplitLevel(i32),

    #[error("corrupt tree data: {0}")]
    Corrupt(String),
}

// Packed flag byte of the on-disk node record.
const MASK_LEAF: u32 = 0b1;
const MASK_HAS_LEFT: u32 = 0b10;
const MASK_HAS_RIGHT: u32 = 0b100;
const AXIS_SHIFT: u32 = 3;
const AXIS_BITS: u32 = 0b11;

/// BSP tree over a scene's triangle primitives.
///
/// Owns the node arena and the shared triangle-index array; leaves address
/// contiguous `(start, count)` spans of the latter. Rebuilt whenever a new
/// model is loaded or the split settings change.
pub struct BspTree {
    pub(crate) nodes: Vec<BspNode>,
    pub(crate) tri_index: Vec<u32>,
    pub(crate) bounds: Aabb,
    pub(crate) split_level: u32,
}

/// Split choice produced by either build strategy.
struct SplitPlane {
    axis: usize,
    coord: f32,
}

impl BspTree {
    /// Build a tree over `prims` bounded by `bounds`.
    ///
    /// `split_level` caps recursion depth; a node with at most
    /// `min_tri_per_node` primitives becomes a leaf. `use_sah` switches from
    /// median splits to the O(n^2)-per-node surface-area-heuristic search.
    pub fn build(
        prims: &[TriPrim],
        bounds: Aabb,
        split_level: u32,
        min_tri_per_node: usize,
        use_sah: bool,
    ) -> Result<Self, TreeError> {
        if split_level == 0 {
            return Err(TreeError::InvalidSplitLevel(0));
        }

        let mut tree = Self {
            nodes: Vec::new(),
            tri_index: Vec::new(),
            bounds,
            split_level,
        };

        let all_ids: Vec<u32> = (0..prims.len() as u32).collect();
        tree.nodes.push(BspNode::unfilled());
        tree.subdivide(0, bounds, all_ids, 0, prims, min_tri_per_node, use_sah);

        log::info!(
            "Built BSP tree ({}): {} nodes, {} leaf references over {} primitives",
            if use_sah { "SAH" } else { "median" },
            tree.nodes.len(),
            tree.tri_index.len(),
            prims.len()
        );

        Ok(tree)
    }

    pub fn nodes(&self) -> &[BspNode] {
        &self.nodes
    }

    pub fn tri_index(&self) -> &[u32] {
        &self.tri_index
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn split_level(&self) -> u32 {
        self.split_level
    }

    /// Depth of the deepest node, for sizing traversal stacks.
    pub fn depth(&self) -> u32 {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 1;
        let mut stack = vec![(0u32, 1u32)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let NodeKind::Internal { left, right, .. } = self.nodes[idx as usize].kind {
                if let Some(l) = left {
                    stack.push((l, depth + 1));
                }
                if let Some(r) = right {
                    stack.push((r, depth + 1));
                }
            }
        }
        max_depth
    }

    fn make_leaf(&mut self, node: usize, prim_ids: &[u32]) {
        let start = self.tri_index.len() as u32;
        self.tri_index.extend_from_slice(prim_ids);
        self.nodes[node].kind = NodeKind::Leaf {
            start,
            count: prim_ids.len() as u32,
        };
    }

    /// Recursive partition shared by both build strategies.
    fn subdivide(
        &mut self,
        node: usize,
        bounds: Aabb,
        prim_ids: Vec<u32>,
        depth: u32,
        prims: &[TriPrim],
        min_tri_per_node: usize,
        use_sah: bool,
    ) {
        if depth >= self.split_level || prim_ids.len() <= min_tri_per_node {
            self.make_leaf(node, &prim_ids);
            return;
        }

        let plane = if use_sah {
            match Self::choose_sah_split(&prim_ids, bounds, prims) {
                Some(plane) => plane,
                None => {
                    self.make_leaf(node, &prim_ids);
                    return;
                }
            }
        } else {
            let axis = bounds.longest_axis();
            SplitPlane {
                axis,
                coord: bounds.centroid()[axis],
            }
        };
        debug_assert!(plane.axis < 3, "degenerate split axis {}", plane.axis);

        let (left_box, right_box) = bounds.split_at(plane.axis, plane.coord);

        // Straddling primitives land in both lists
        let mut left_ids = Vec::new();
        let mut right_ids = Vec::new();
        for &id in &prim_ids {
            let prim = &prims[id as usize];
            if prim.overlaps_box(&left_box) {
                left_ids.push(id);
            }
            if prim.overlaps_box(&right_box) {
                right_ids.push(id);
            }
        }

        if left_ids.is_empty() && right_ids.is_empty() {
            // SAT epsilon corner case: never drop primitives
            log::debug!(
                "split at {} on axis {} matched no primitives, keeping leaf",
                plane.coord,
                plane.axis
            );
            self.make_leaf(node, &prim_ids);
            return;
        }

        // Children of one split are allocated contiguously so the on-disk
        // offset encoding can address them as offset / offset + 1.
        let left = if left_ids.is_empty() {
            None
        } else {
            let idx = self.nodes.len() as u32;
            self.nodes.push(BspNode::unfilled());
            Some(idx)
        };
        let right = if right_ids.is_empty() {
            None
        } else {
            let idx = self.nodes.len() as u32;
            self.nodes.push(BspNode::unfilled());
            Some(idx)
        };

        self.nodes[node].kind = NodeKind::Internal {
            axis: plane.axis as u8,
            split: plane.coord,
            left,
            right,
        };

        if let Some(l) = left {
            self.subdivide(
                l as usize,
                left_box,
                left_ids,
                depth + 1,
                prims,
                min_tri_per_node,
                use_sah,
            );
        }
        if let Some(r) = right {
            self.subdivide(
                r as usize,
                right_box,
                right_ids,
                depth + 1,
                prims,
                min_tri_per_node,
                use_sah,
            );
        }
    }

    /// Exhaustive SAH candidate search.
    ///
    /// Every primitive's min and max extent on every axis is a candidate
    /// split coordinate; each candidate is scored as
    /// `0.5 + left_area * left_count + right_area * right_count` and the
    /// minimum wins. Candidates outside the node bounds (possible for
    /// straddlers inherited from the parent) are skipped.
    fn choose_sah_split(
        prim_ids: &[u32],
        bounds: Aabb,
        prims: &[TriPrim],
    ) -> Option<SplitPlane> {
        let mut best: Option<SplitPlane> = None;
        let mut best_cost = f32::INFINITY;

        for &id in prim_ids {
            let prim = &prims[id as usize];
            for axis in 0..3 {
                for want_max in [false, true] {
                    let coord = prim.axis_bound(axis, want_max);
                    let iv = bounds.axis_interval(axis);
                    if coord <= iv.min || coord >= iv.max {
                        continue;
                    }

                    let (left_box, right_box) = bounds.split_at(axis, coord);
                    let mut left_count = 0usize;
                    let mut right_count = 0usize;
                    for &other_id in prim_ids {
                        let other = &prims[other_id as usize];
                        if other.overlaps_box(&left_box) {
                            left_count += 1;
                        }
                        if other.overlaps_box(&right_box) {
                            right_count += 1;
                        }
                    }

                    let cost = 0.5
                        + left_box.surface_area() * left_count as f32
                        + right_box.surface_area() * right_count as f32;
                    if cost < best_cost {
                        best_cost = cost;
                        best = Some(SplitPlane { axis, coord });
                    }
                }
            }
        }

        best
    }

    /// Write the tree in the legacy `.kdtree` layout (little-endian,
    /// unversioned): split level, root AABB, node records, triangle-index
    /// array. Internal nodes store their split coordinate through its f32
    /// bit pattern.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TreeError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&(self.split_level as i32).to_le_bytes())?;
        for v in [
            self.bounds.x.min,
            self.bounds.x.max,
            self.bounds.y.min,
            self.bounds.y.max,
            self.bounds.z.min,
            self.bounds.z.max,
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }

        writer.write_all(&(self.nodes.len() as u32).to_le_bytes())?;
        for node in &self.nodes {
            let (internal1, internal2, masked) = match node.kind {
                NodeKind::Leaf { start, count } => (start, count, MASK_LEAF),
                NodeKind::Internal {
                    axis,
                    split,
                    left,
                    right,
                } => {
                    let offset = match left.or(right) {
                        Some(offset) => offset,
                        None => {
                            return Err(TreeError::Corrupt(
                                "internal node with no children".into(),
                            ))
                        }
                    };
                    if let (Some(l), Some(r)) = (left, right) {
                        debug_assert_eq!(r, l + 1, "siblings not contiguous");
                    }

                    let mut masked = (axis as u32 & AXIS_BITS) << AXIS_SHIFT;
                    if left.is_some() {
                        masked |= MASK_HAS_LEFT;
                    }
                    if right.is_some() {
                        masked |= MASK_HAS_RIGHT;
                    }
                    (offset, split.to_bits(), masked)
                }
            };
            writer.write_all(&internal1.to_le_bytes())?;
            writer.write_all(&internal2.to_le_bytes())?;
            writer.write_all(&masked.to_le_bytes())?;
        }

        writer.write_all(&(self.tri_index.len() as u32).to_le_bytes())?;
        for idx in &self.tri_index {
            writer.write_all(&idx.to_le_bytes())?;
        }
        writer.flush()?;

        log::info!(
            "Saved BSP tree: {} nodes, {} triangle references",
            self.nodes.len(),
            self.tri_index.len()
        );
        Ok(())
    }

    /// Read a tree written by [`save`]. A missing file, short read, or
    /// out-of-range reference aborts the load; no partial tree is returned.
    ///
    /// [`save`]: BspTree::save
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TreeError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);

        let split_level = read_i32(&mut reader)?;
        if split_level <= 0 {
            return Err(TreeError::InvalidSplitLevel(split_level));
        }

        let x1 = read_f32(&mut reader)?;
        let x2 = read_f32(&mut reader)?;
        let y1 = read_f32(&mut reader)?;
        let y2 = read_f32(&mut reader)?;
        let z1 = read_f32(&mut reader)?;
        let z2 = read_f32(&mut reader)?;
        let bounds = Aabb::new(
            Interval::new(x1, x2),
            Interval::new(y1, y2),
            Interval::new(z1, z2),
        );

        let node_count = read_u32(&mut reader)?;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            let internal1 = read_u32(&mut reader)?;
            let internal2 = read_u32(&mut reader)?;
            let masked = read_u32(&mut reader)?;

            let kind = if masked & MASK_LEAF != 0 {
                NodeKind::Leaf {
                    start: internal1,
                    count: internal2,
                }
            } else {
                let has_left = masked & MASK_HAS_LEFT != 0;
                let has_right = masked & MASK_HAS_RIGHT != 0;
                if !has_left && !has_right {
                    return Err(TreeError::Corrupt(
                        "internal node with no children".into(),
                    ));
                }

                // A lone survivor sits at the recorded offset; with both
                // children present the right one follows the left.
                let left = has_left.then_some(internal1);
                let right = if has_right {
                    Some(if has_left { internal1 + 1 } else { internal1 })
                } else {
                    None
                };

                NodeKind::Internal {
                    axis: ((masked >> AXIS_SHIFT) & AXIS_BITS) as u8,
                    split: f32::from_bits(internal2),
                    left,
                    right,
                }
            };
            nodes.push(BspNode { kind });
        }

        let tri_count = read_u32(&mut reader)?;
        let mut tri_index = Vec::with_capacity(tri_count as usize);
        for _ in 0..tri_count {
            tri_index.push(read_u32(&mut reader)?);
        }

        // Reject dangling references up front rather than at traversal time
        for node in &nodes {
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    if start as usize + count as usize > tri_index.len() {
                        return Err(TreeError::Corrupt("leaf span out of range".into()));
                    }
                }
                NodeKind::Internal { left, right, .. } => {
                    for child in [left, right].into_iter().flatten() {
                        if child as usize >= nodes.len() {
                            return Err(TreeError::Corrupt("child index out of range".into()));
                        }
                    }
                }
            }
        }

        log::info!(
            "Loaded BSP tree: {} nodes, {} triangle references, split level {}",
            nodes.len(),
            tri_index.len(),
            split_level
        );

        Ok(Self {
            nodes,
            tri_index,
            bounds,
            split_level: split_level as u32,
        })
    }
}

fn read_exact_or_truncated(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), TreeError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TreeError::Truncated
        } else {
            TreeError::Io(e)
        }
    })
}

fn read_u32(reader: &mut impl Read) -> Result<u32, TreeError> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(reader: &mut impl Read) -> Result<i32, TreeError> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(reader: &mut impl Read) -> Result<f32, TreeError> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}
