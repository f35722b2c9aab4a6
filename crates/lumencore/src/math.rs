//! Math primitives — glam re-exports plus the affine transform, bounding box,
//! and ray types the rest of the crate builds on.
//!
//! We re-export [glam](https://docs.rs/glam) vector/matrix types directly
//! rather than wrapping them: `Vec3` serves as vector, point, *and* normal.
//! Normals carry a unit-length invariant only after an explicit
//! [`Vec3::normalize`] call — nothing here enforces it earlier, matching the
//! tolerance for non-unit intermediates described in the geometry layer.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use std::sync::OnceLock;

/// A right-handed, column-vector 4x4 affine transform with a lazily computed
/// inverse.
///
/// The inverse is recomputed from scratch on first use after construction or
/// mutation and cached; `Transform` is therefore cheap to clone (the cache
/// resets) but expensive to query repeatedly only the first time.
#[derive(Debug, Clone)]
pub struct Transform {
    forward: Mat4,
    inverse: OnceLock<Mat4>,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        forward: Mat4::IDENTITY,
        inverse: OnceLock::new(),
    };

    pub fn new(forward: Mat4) -> Self {
        Self {
            forward,
            inverse: OnceLock::new(),
        }
    }

    pub fn from_translation(t: Vec3) -> Self {
        Self::new(Mat4::from_translation(t))
    }

    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        Self::new(Mat4::look_at_rh(eye, target, up).inverse())
    }

    pub fn forward(&self) -> &Mat4 {
        &self.forward
    }

    /// The matching inverse, computed once and cached. Callers never see a
    /// forward/inverse pair that disagree: there is exactly one forward
    /// matrix per `Transform`, and the inverse is derived from it.
    pub fn inverse(&self) -> &Mat4 {
        self.inverse.get_or_init(|| self.forward.inverse())
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.forward.transform_point3(p)
    }

    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.forward.transform_vector3(v)
    }

    /// Normals transform by the inverse-transpose, per the coordinate
    /// convention in the external-interfaces section of the spec.
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        self.inverse().transpose().transform_vector3(n)
    }

    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.inverse().transform_point3(p)
    }

    pub fn inverse_transform_vector(&self, v: Vec3) -> Vec3 {
        self.inverse().transform_vector3(v)
    }

    pub fn compose(&self, other: &Transform) -> Transform {
        Transform::new(self.forward * other.forward)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// An axis-aligned bounding box. Used by every BVH build in the crate (mesh
/// triangles, bevel bounding cylinders, DLSC entries) as the payload bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds3 {
    pub const EMPTY: Bounds3 = Bounds3 {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn point(p: Vec3) -> Self {
        Bounds3 { min: p, max: p }
    }

    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Bounds3 {
            min: a.min(b).min(c),
            max: a.max(b).max(c),
        }
    }

    pub fn union(&self, other: &Bounds3) -> Bounds3 {
        Bounds3 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn union_point(&self, p: Vec3) -> Bounds3 {
        Bounds3 {
            min: self.min.min(p),
            max: self.max.max(p),
        }
    }

    pub fn expand(&self, delta: f32) -> Bounds3 {
        Bounds3 {
            min: self.min - Vec3::splat(delta),
            max: self.max + Vec3::splat(delta),
        }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn diagonal(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn surface_area(&self) -> f32 {
        let d = self.diagonal();
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// The axis (0=x, 1=y, 2=z) along which this box is widest. Used by the
    /// median-split BVH builder to pick a split axis.
    pub fn max_extent_axis(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Slab-test ray/box intersection, returning the overlap of `[mint, maxt]`
    /// with the box's parametric hit interval, if any.
    pub fn intersect_ray(&self, origin: Vec3, inv_dir: Vec3, mint: f32, maxt: f32) -> bool {
        let mut t0 = mint;
        let mut t1 = maxt;
        for axis in 0..3 {
            let o = origin[axis];
            let d = inv_dir[axis];
            let mut near = (self.min[axis] - o) * d;
            let mut far = (self.max[axis] - o) * d;
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return false;
            }
        }
        true
    }
}

impl Default for Bounds3 {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A ray: origin, direction, valid parametric range `[mint, maxt)`, and a
/// time sample for motion-blurred instances.
///
/// Invariant: `mint < maxt` must hold at trace time; callers that shrink
/// `maxt` as closer hits are found must never push it below `mint`.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub mint: f32,
    pub maxt: f32,
    pub time: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Ray {
            origin,
            direction,
            mint: 1e-4,
            maxt: f32::INFINITY,
            time: 0.0,
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    pub fn inv_direction(&self) -> Vec3 {
        Vec3::new(1.0 / self.direction.x, 1.0 / self.direction.y, 1.0 / self.direction.z)
    }

    pub fn transformed(&self, xform: &Transform) -> Ray {
        Ray {
            origin: xform.inverse_transform_point(self.origin),
            direction: xform.inverse_transform_vector(self.direction),
            mint: self.mint,
            maxt: self.maxt,
            time: self.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_inverse_matches_forward() {
        let t = Transform::new(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let p = Vec3::new(5.0, -1.0, 2.0);
        let roundtrip = t.inverse_transform_point(t.transform_point(p));
        assert!((roundtrip - p).length() < 1e-5);
    }

    #[test]
    fn bounds_union_contains_both() {
        let a = Bounds3::point(Vec3::ZERO);
        let b = Bounds3::point(Vec3::splat(2.0));
        let u = a.union(&b);
        assert!(u.contains(Vec3::splat(1.0)));
        assert!(u.contains(Vec3::ZERO));
        assert!(u.contains(Vec3::splat(2.0)));
    }

    #[test]
    fn ray_mint_maxt_invariant_holds_by_construction() {
        let r = Ray::new(Vec3::ZERO, Vec3::X);
        assert!(r.mint < r.maxt);
    }
}
