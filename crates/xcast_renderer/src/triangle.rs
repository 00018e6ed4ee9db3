//! Triangle primitives for tree construction and ray intersection.
//!
//! Rays are tested with Wald's projection method: each triangle caches its
//! dominant normal axis and a 2D barycentric setup, so the hot-path test is
//! a handful of multiply-adds. Tree construction uses a separating-axis
//! triangle/box overlap test so straddling triangles land in both children.

use xcast_math::{Aabb, Ray, Vec3};

/// A triangle with a cached (unnormalized-input, stored-normalized) normal.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub normal: Vec3,
}

impl Triangle {
    /// Create a triangle; the face normal is computed from the winding.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        Self { v0, v1, v2, normal }
    }
}

/// Wald's precomputed triangle representation.
///
/// The triangle plane is expressed in the coordinate frame of the normal's
/// dominant axis `k`; hit points are reduced to 2D and tested against a
/// precomputed barycentric setup.
#[derive(Debug, Clone, Copy)]
pub struct WaldTriangle {
    /// Dominant axis of the normal (projection axis).
    k: usize,
    /// The two remaining axes, (k+1)%3 and (k+2)%3.
    ku: usize,
    kv: usize,
    /// Plane coefficients scaled by 1/n[k].
    n_u: f32,
    n_v: f32,
    n_d: f32,
    /// First vertex projected into the (ku, kv) plane.
    a_u: f32,
    a_v: f32,
    /// Barycentric setup for the two edges.
    b_nu: f32,
    b_nv: f32,
    c_nu: f32,
    c_nv: f32,
}

impl WaldTriangle {
    /// Precompute the representation. Returns `None` for degenerate
    /// triangles (zero-area or zero dominant normal component).
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Option<Self> {
        let n = (v1 - v0).cross(v2 - v0);
        if n.length_squared() == 0.0 {
            return None;
        }

        let abs = n.abs();
        let k = if abs.x >= abs.y && abs.x >= abs.z {
            0
        } else if abs.y >= abs.z {
            1
        } else {
            2
        };
        let ku = (k + 1) % 3;
        let kv = (k + 2) % 3;

        let nk = n[k];
        if nk == 0.0 {
            return None;
        }

        // Edges AB and AC in the projection plane
        let cx = v1[ku] - v0[ku];
        let cy = v1[kv] - v0[kv];
        let bx = v2[ku] - v0[ku];
        let by = v2[kv] - v0[kv];

        let det = cx * by - cy * bx;
        if det == 0.0 {
            return None;
        }
        let inv_det = 1.0 / det;

        Some(Self {
            k,
            ku,
            kv,
            n_u: n[ku] / nk,
            n_v: n[kv] / nk,
            n_d: n.dot(v0) / nk,
            a_u: v0[ku],
            a_v: v0[kv],
            b_nu: -bx * inv_det,
            b_nv: by * inv_det,
            c_nu: cx * inv_det,
            c_nv: -cy * inv_det,
        })
    }

    /// Ray/triangle test. On a hit within `(tmin, tmax)` returns the hit
    /// distance in multiples of the ray direction.
    #[inline]
    pub fn intersect(&self, ray: &Ray, tmin: f32, tmax: f32, epsilon: f32) -> Option<f32> {
        let org = ray.origin;
        let dir = ray.direction;

        let denom = dir[self.k] + self.n_u * dir[self.ku] + self.n_v * dir[self.kv];
        if denom.abs() < epsilon {
            // Ray parallel to the triangle plane
            return None;
        }

        let t = (self.n_d - org[self.k] - self.n_u * org[self.ku] - self.n_v * org[self.kv])
            / denom;
        if t < tmin || t > tmax {
            return None;
        }

        // Hit point in the projection plane, relative to vertex A
        let hu = org[self.ku] + t * dir[self.ku] - self.a_u;
        let hv = org[self.kv] + t * dir[self.kv] - self.a_v;

        let beta = hu * self.b_nv + hv * self.b_nu;
        if beta < 0.0 {
            return None;
        }
        let gamma = hu * self.c_nv + hv * self.c_nu;
        if gamma < 0.0 {
            return None;
        }
        if beta + gamma > 1.0 {
            return None;
        }

        Some(t)
    }

    /// Shift the cached plane/vertex terms after a pure translation.
    fn translate(&mut self, n: Vec3, offset: Vec3) {
        self.n_d += n.dot(offset) / n[self.k];
        self.a_u += offset[self.ku];
        self.a_v += offset[self.kv];
    }
}

/// A renderable triangle primitive: geometry plus everything the tree
/// builder and the traversal need cached.
#[derive(Debug, Clone, Copy)]
pub struct TriPrim {
    pub triangle: Triangle,
    pub wald: WaldTriangle,
    /// Surface area, used by the SAH cost function.
    pub area: f32,
    /// Signed distance of the triangle plane from the origin.
    pub d: f32,
    /// Stable index into the mesh's global triangle array.
    pub index: u32,
}

impl TriPrim {
    /// Build a primitive from three vertices. Returns `None` for degenerate
    /// triangles; callers are expected to log and skip those.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, index: u32) -> Option<Self> {
        let wald = WaldTriangle::new(v0, v1, v2)?;
        let triangle = Triangle::new(v0, v1, v2);
        let area = 0.5 * (v1 - v0).cross(v2 - v0).length();
        let d = triangle.normal.dot(v0);

        Some(Self {
            triangle,
            wald,
            area,
            d,
            index,
        })
    }

    /// Ray intersection against the precomputed representation.
    #[inline]
    pub fn intersect(&self, ray: &Ray, tmin: f32, tmax: f32, epsilon: f32) -> Option<f32> {
        self.wald.intersect(ray, tmin, tmax, epsilon)
    }

    /// The triangle's min or max extent along `axis`.
    pub fn axis_bound(&self, axis: usize, want_max: bool) -> f32 {
        let t = &self.triangle;
        let (a, b, c) = (t.v0[axis], t.v1[axis], t.v2[axis]);
        if want_max {
            a.max(b).max(c)
        } else {
            a.min(b).min(c)
        }
    }

    /// Tight bounding box of the triangle.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_triangle(self.triangle.v0, self.triangle.v1, self.triangle.v2)
    }

    /// Separating-axis triangle/box overlap test (Akenine-Moller).
    ///
    /// Partial overlap counts: a triangle straddling a splitting plane must
    /// test true against BOTH child boxes.
    pub fn overlaps_box(&self, bounds: &Aabb) -> bool {
        let center = bounds.centroid();
        let h = bounds.half_size();

        let v0 = self.triangle.v0 - center;
        let v1 = self.triangle.v1 - center;
        let v2 = self.triangle.v2 - center;

        // 1. Box face normals: compare triangle extent per axis
        for axis in 0..3 {
            let min = v0[axis].min(v1[axis]).min(v2[axis]);
            let max = v0[axis].max(v1[axis]).max(v2[axis]);
            if min > h[axis] || max < -h[axis] {
                return false;
            }
        }

        // 2. Triangle plane normal: all vertices project to the same point
        let n = (v1 - v0).cross(v2 - v0);
        let r = h.x * n.x.abs() + h.y * n.y.abs() + h.z * n.z.abs();
        if n.dot(v0).abs() > r {
            return false;
        }

        // 3. Nine edge x box-axis cross products
        let edges = [v1 - v0, v2 - v1, v0 - v2];
        let box_axes = [Vec3::X, Vec3::Y, Vec3::Z];
        for edge in edges {
            for unit in box_axes {
                let axis = edge.cross(unit);
                let p0 = axis.dot(v0);
                let p1 = axis.dot(v1);
                let p2 = axis.dot(v2);
                let min = p0.min(p1).min(p2);
                let max = p0.max(p1).max(p2);
                let rad = h.x * axis.x.abs() + h.y * axis.y.abs() + h.z * axis.z.abs();
                if min > rad || max < -rad {
                    return false;
                }
            }
        }

        true
    }

    /// Translate the primitive without rotating it, recomputing the plane
    /// distance and the cached projection terms.
    pub fn translate(&mut self, offset: Vec3) {
        let unnormalized = (self.triangle.v1 - self.triangle.v0)
            .cross(self.triangle.v2 - self.triangle.v0);

        self.triangle.v0 += offset;
        self.triangle.v1 += offset;
        self.triangle.v2 += offset;
        self.d = self.triangle.normal.dot(self.triangle.v0);
        self.wald.translate(unnormalized, offset);
    }
}
