//! Render engine: pose-dependent view geometry, tile-parallel ray casting,
//! and per-render statistics.
//!
//! The specimen pose is expressed by rotating the source point and detector
//! plane opposite to the requested rotation, which is cheaper than rotating
//! the scene geometry. Each render partitions the image into a grid of
//! tiles; tiles are rendered as independent parallel tasks that share only
//! read-only state, and their results are folded sequentially afterwards so
//! output is deterministic.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use xcast_math::{Aabb, Mat3, Ray, Vec3};

use crate::config::RenderSettings;
use crate::scene::Scene;
use crate::screen::ScreenBuffer;
use crate::stats::{RayPenetration, RenderReport, TriIntersection};
use crate::traverse::{sort_and_dedup_hits, Hit, TraversalStack};

/// How ray results map to pixel colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Grayscale proportional to accumulated penetration length.
    Penetration,
    /// Two-color interpolation keyed by average dip angle.
    DipAngle,
}

/// A rectangular region of the output image owned by one render task.
#[derive(Debug, Clone, Copy)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// World-space view geometry cached for the current pose.
#[derive(Debug, Clone, Copy)]
struct ViewGeometry {
    /// X-ray source point.
    source: Vec3,
    /// Low corner of the detector plane.
    corner: Vec3,
    /// Per-pixel steps along the plane edges.
    dx: Vec3,
    dy: Vec3,
}

/// Everything one ray contributes to its tile.
struct RayOutcome {
    color: u32,
    penetration: f32,
    dip_sum: f32,
    hit_count: u32,
    bad_count: u32,
}

/// Private accumulation state of one tile task.
struct TileResult {
    tile: Tile,
    pixels: Vec<u32>,
    sum_penetration: f32,
    active_rays: u32,
    max_penetration: f32,
    dip_sum: f32,
    hit_count: u32,
    bad_count: u32,
    rays: Vec<RayPenetration>,
    intersections: Vec<TriIntersection>,
}

/// CPU raycasting engine bound to one scene and one output resolution.
pub struct Engine {
    scene: Arc<Scene>,
    settings: RenderSettings,
    rotation: Vec3,
    position: Vec3,
    cut_aabbs: Vec<Aabb>,
    screen: ScreenBuffer,
    view: ViewGeometry,
    report: RenderReport,
}

impl Engine {
    /// Create an engine rendering `scene` into an owned buffer.
    pub fn new(scene: Arc<Scene>, settings: RenderSettings, width: u32, height: u32) -> Self {
        let view = compute_view(&settings, Vec3::ZERO, Vec3::ZERO, width, height);
        Self {
            scene,
            settings,
            rotation: Vec3::ZERO,
            position: Vec3::ZERO,
            cut_aabbs: Vec::new(),
            screen: ScreenBuffer::new(width, height),
            view,
            report: RenderReport::default(),
        }
    }

    /// Set the specimen rotation (radians around X, Y, Z).
    pub fn set_rotation(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Vec3::new(x, y, z);
    }

    /// Set the specimen position offset.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Restrict rendering to rays that enter at least one of the given
    /// boxes. An empty list disables the culling.
    pub fn set_cut_aabbs(&mut self, cut_aabbs: Vec<Aabb>) {
        self.cut_aabbs = cut_aabbs;
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }

    pub fn report(&self) -> &RenderReport {
        &self.report
    }

    pub fn last_avg_penetration(&self) -> f32 {
        self.report.avg_penetration
    }

    pub fn last_avg_dip_angle(&self) -> f32 {
        self.report.avg_dip_angle
    }

    /// Recompute the view geometry for the current pose.
    ///
    /// Called by [`render`]; exposed for callers that want to inspect the
    /// geometry before committing to a full frame.
    ///
    /// [`render`]: Engine::render
    pub fn init_render(&mut self) {
        self.view = compute_view(
            &self.settings,
            self.rotation,
            self.position,
            self.screen.width,
            self.screen.height,
        );
    }

    /// Render one full frame.
    ///
    /// With `remember_data` set, per-ray penetration records and
    /// per-intersection dip records are retained on the report for
    /// downstream pose analysis.
    pub fn render(&mut self, mode: ColorMode, remember_data: bool) {
        let start = Instant::now();
        self.init_render();

        self.report.clear();
        self.report.rotation = self.rotation;
        self.report.position = self.position;

        let width = self.screen.width;
        let height = self.screen.height;
        let tiles = make_tiles(
            width,
            height,
            self.settings.thread_grid_x,
            self.settings.thread_grid_y,
        );

        let scene = &*self.scene;
        let settings = &self.settings;
        let cut_aabbs = &self.cut_aabbs[..];
        let view = self.view;

        // One task per tile; tasks share only read-only state and own their
        // pixels, traversal stack, and counters.
        let results: Vec<TileResult> = tiles
            .par_iter()
            .map(|&tile| render_tile(scene, settings, cut_aabbs, view, tile, mode, remember_data))
            .collect();

        // Sequential fold keeps the output independent of task scheduling.
        let mut sum_penetration = 0.0f32;
        let mut active_rays = 0u32;
        let mut max_penetration = 0.0f32;
        let mut dip_sum = 0.0f32;
        let mut hit_count = 0u32;
        let mut bad_count = 0u32;

        for result in results {
            let tile = result.tile;
            for local_y in 0..tile.height {
                for local_x in 0..tile.width {
                    let gx = tile.x + local_x;
                    let gy = tile.y + local_y;
                    let color = result.pixels[(local_y * tile.width + local_x) as usize];
                    // The projection image is horizontally mirrored
                    self.screen.set(width - gx - 1, gy, color);
                }
            }

            sum_penetration += result.sum_penetration;
            active_rays += result.active_rays;
            max_penetration = max_penetration.max(result.max_penetration);
            dip_sum += result.dip_sum;
            hit_count += result.hit_count;
            bad_count += result.bad_count;

            if remember_data {
                self.report.rays.extend(result.rays);
                self.report.intersections.extend(result.intersections);
            }
        }

        self.report.avg_penetration = if active_rays > 0 {
            sum_penetration / active_rays as f32
        } else {
            0.0
        };
        self.report.avg_dip_angle = if hit_count > 0 {
            dip_sum / hit_count as f32
        } else {
            0.0
        };
        self.report.bad_area_percent = if hit_count > 0 {
            bad_count as f32 / hit_count as f32
        } else {
            0.0
        };
        self.report.max_penetration = max_penetration;

        log::debug!(
            "Rendered {}x{} ({} tiles) in {:?}: avg penetration {:.4}, avg dip {:.4}",
            width,
            height,
            tiles.len(),
            start.elapsed(),
            self.report.avg_penetration,
            self.report.avg_dip_angle
        );
    }
}

/// Derive the source point and detector plane for a pose.
///
/// The inverse rotation `Rz(-z) * Ry(-y) * Rx(-x)` is applied to the
/// unrotated geometry and the specimen position is subtracted, which leaves
/// the scene (and its acceleration tree) untouched.
fn compute_view(
    settings: &RenderSettings,
    rotation: Vec3,
    position: Vec3,
    width: u32,
    height: u32,
) -> ViewGeometry {
    let inverse = Mat3::from_rotation_z(-rotation.z)
        * Mat3::from_rotation_y(-rotation.y)
        * Mat3::from_rotation_x(-rotation.x);

    let source = Vec3::new(0.0, 0.0, settings.source_z);
    let corner = Vec3::new(
        -settings.plane_half_width,
        -settings.plane_half_height,
        settings.plane_z,
    );
    let dx = Vec3::new(2.0 * settings.plane_half_width / width as f32, 0.0, 0.0);
    let dy = Vec3::new(0.0, 2.0 * settings.plane_half_height / height as f32, 0.0);

    ViewGeometry {
        source: inverse * source - position,
        corner: inverse * corner - position,
        dx: inverse * dx,
        dy: inverse * dy,
    }
}

/// Partition the image into a thread-grid of tiles; the last row and column
/// absorb the remainder.
fn make_tiles(width: u32, height: u32, grid_x: u32, grid_y: u32) -> Vec<Tile> {
    let base_w = width / grid_x;
    let base_h = height / grid_y;

    let mut tiles = Vec::with_capacity((grid_x * grid_y) as usize);
    for ty in 0..grid_y {
        for tx in 0..grid_x {
            let x = tx * base_w;
            let y = ty * base_h;
            let w = if tx == grid_x - 1 { width - x } else { base_w };
            let h = if ty == grid_y - 1 { height - y } else { base_h };
            tiles.push(Tile {
                x,
                y,
                width: w,
                height: h,
            });
        }
    }
    tiles
}

/// Render every pixel of one tile.
fn render_tile(
    scene: &Scene,
    settings: &RenderSettings,
    cut_aabbs: &[Aabb],
    view: ViewGeometry,
    tile: Tile,
    mode: ColorMode,
    remember_data: bool,
) -> TileResult {
    let mut result = TileResult {
        tile,
        pixels: Vec::with_capacity((tile.width * tile.height) as usize),
        sum_penetration: 0.0,
        active_rays: 0,
        max_penetration: 0.0,
        dip_sum: 0.0,
        hit_count: 0,
        bad_count: 0,
        rays: Vec::new(),
        intersections: Vec::new(),
    };

    let mut stack = TraversalStack::for_tree(scene.tree());
    let mut hits = Vec::new();

    for local_y in 0..tile.height {
        for local_x in 0..tile.width {
            let gx = tile.x + local_x;
            let gy = tile.y + local_y;

            let target =
                view.corner + view.dx * (gx as f32 + 0.5) + view.dy * (gy as f32 + 0.5);
            let ray = Ray::new(view.source, (target - view.source).normalize());

            let intersections = remember_data.then_some(&mut result.intersections);
            let outcome = cast_ray(
                scene, settings, cut_aabbs, &ray, 1, mode, &mut stack, &mut hits, intersections,
            );

            result.pixels.push(outcome.color);
            if outcome.penetration > 0.0 {
                result.sum_penetration += outcome.penetration;
                result.active_rays += 1;
                result.max_penetration = result.max_penetration.max(outcome.penetration);
            }
            result.dip_sum += outcome.dip_sum;
            result.hit_count += outcome.hit_count;
            result.bad_count += outcome.bad_count;

            if remember_data && outcome.hit_count > 0 {
                result.rays.push(RayPenetration {
                    x: gx,
                    y: gy,
                    total_penetration: outcome.penetration,
                    hit_count: outcome.hit_count,
                });
            }
        }
    }

    result
}

/// Trace one ray and derive its color and statistics.
#[allow(clippy::too_many_arguments)]
fn cast_ray(
    scene: &Scene,
    settings: &RenderSettings,
    cut_aabbs: &[Aabb],
    ray: &Ray,
    depth: u32,
    mode: ColorMode,
    stack: &mut TraversalStack,
    hits: &mut Vec<Hit>,
    intersections_out: Option<&mut Vec<TriIntersection>>,
) -> RayOutcome {
    let no_hit = RayOutcome {
        color: 0,
        penetration: 0.0,
        dip_sum: 0.0,
        hit_count: 0,
        bad_count: 0,
    };

    // Safety bound; the engine only calls at depth 1 today
    if depth > settings.trace_depth {
        return no_hit;
    }

    // Region-of-interest culling: skip rays that miss every cut box
    if !cut_aabbs.is_empty() && !cut_aabbs.iter().any(|b| b.hit_range(ray).is_some()) {
        return no_hit;
    }

    scene
        .tree()
        .intersect_all(ray, scene.prims(), settings.epsilon, stack, hits);
    sort_and_dedup_hits(hits);

    if hits.is_empty() {
        return no_hit;
    }

    // An even crossing count pairs up as entry/exit through solid material.
    // TODO: decide how open surfaces (odd counts) should pair; until then
    // such rays accumulate no penetration.
    let mut penetration = 0.0f32;
    if hits.len() % 2 == 0 {
        for pair in hits.chunks(2) {
            penetration += pair[1].dist - pair[0].dist;
        }
    }

    let mut dip_sum = 0.0f32;
    let mut bad_count = 0u32;
    if let Some(out) = intersections_out {
        for hit in hits.iter() {
            let prim = &scene.prims()[hit.tri as usize];
            let dip_cos = ray.direction.dot(prim.triangle.normal).abs();
            dip_sum += dip_cos;
            if dip_cos < settings.bad_angle_cos {
                bad_count += 1;
            }
            out.push(TriIntersection {
                tri: prim.index,
                dip_cos,
            });
        }
    } else {
        for hit in hits.iter() {
            let dip_cos = ray
                .direction
                .dot(scene.prims()[hit.tri as usize].triangle.normal)
                .abs();
            dip_sum += dip_cos;
            if dip_cos < settings.bad_angle_cos {
                bad_count += 1;
            }
        }
    }

    let hit_count = hits.len() as u32;
    let color = match mode {
        ColorMode::Penetration => {
            let t = (penetration * settings.coloring_coef / settings.max_penetration)
                .clamp(0.0, 1.0);
            let gray = (t * 255.0) as u8;
            ScreenBuffer::pack_rgb(gray, gray, gray)
        }
        ColorMode::DipAngle => {
            let t = (dip_sum / hit_count as f32).clamp(0.0, 1.0);
            let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
            ScreenBuffer::pack_rgb(
                lerp(settings.color_near[0], settings.color_far[0]),
                lerp(settings.color_near[1], settings.color_far[1]),
                lerp(settings.color_near[2], settings.color_far[2]),
            )
        }
    };

    RayOutcome {
        color,
        penetration,
        dip_sum,
        hit_count,
        bad_count,
    }
}
