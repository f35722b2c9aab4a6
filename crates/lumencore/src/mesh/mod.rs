//! # Triangle Meshes
//!
//! A [`TriangleMesh`] owns its vertex/index/attribute arrays and a BVH over
//! its own triangles. Object instancing is a [`MeshRef`] variant rather than
//! a second mesh type with shared mutable internals: an instance wraps an
//! `Arc<TriangleMesh>` plus a world transform and re-runs the same
//! intersection code in local space, instead of a pointer to a possibly-
//! mutated base mesh (the redesign flag calls out the original's
//! pointer-aliased instancing as the thing to fix here).

pub mod bevel;

use crate::bvh::{Bounded, IndexBvh};
use crate::color::Spectrum;
use crate::error::{RenderError, Result};
use crate::math::{Bounds3, Ray, Transform, Vec2, Vec3};
use bevel::BevelData;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct TriPrim {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
}

impl Bounded for TriPrim {
    fn bounds(&self) -> Bounds3 {
        Bounds3::from_points(self.v0, self.v1, self.v2)
    }
}

/// Result of a local-space ray/mesh intersection: barycentric coordinates
/// plus the hit triangle's index, enough for the caller to interpolate any
/// per-vertex attribute.
#[derive(Debug, Clone, Copy)]
pub struct MeshHit {
    pub t: f32,
    pub triangle: u32,
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
}

pub struct TriangleMesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
    pub normals: Option<Vec<Vec3>>,
    /// Up to 8 UV channels, each one value per vertex.
    pub uv_channels: Vec<Vec<Vec2>>,
    pub color_channels: Vec<Vec<Spectrum>>,
    pub alpha_channels: Vec<Vec<f32>>,
    tri_normals: Vec<Vec3>,
    bvh: IndexBvh,
    prims: Vec<TriPrim>,
    pub bevel_radius: f32,
    bevel: Option<BevelData>,
}

impl TriangleMesh {
    pub fn build(
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        normals: Option<Vec<Vec3>>,
        uv_channels: Vec<Vec<Vec2>>,
        color_channels: Vec<Vec<Spectrum>>,
        alpha_channels: Vec<Vec<f32>>,
        bevel_radius: f32,
    ) -> Result<Self> {
        for t in &triangles {
            for &idx in t {
                if idx as usize >= vertices.len() {
                    return Err(RenderError::Invariant(format!("triangle references out-of-range vertex {idx}")));
                }
            }
        }
        let tri_normals: Vec<Vec3> = triangles
            .iter()
            .map(|t| {
                let (a, b, c) = (vertices[t[0] as usize], vertices[t[1] as usize], vertices[t[2] as usize]);
                (b - a).cross(c - a).normalize_or_zero()
            })
            .collect();
        let prims: Vec<TriPrim> = triangles
            .iter()
            .map(|t| TriPrim { v0: vertices[t[0] as usize], v1: vertices[t[1] as usize], v2: vertices[t[2] as usize] })
            .collect();
        let bvh = IndexBvh::build(&prims);
        let bevel =
            if bevel_radius > 0.0 { Some(bevel::preprocess(&vertices, &triangles, &tri_normals, bevel_radius)) } else { None };

        Ok(TriangleMesh {
            vertices,
            triangles,
            normals,
            uv_channels,
            color_channels,
            alpha_channels,
            tri_normals,
            bvh,
            prims,
            bevel_radius,
            bevel,
        })
    }

    pub fn bounds(&self) -> Bounds3 {
        self.vertices.iter().fold(Bounds3::EMPTY, |b, &v| b.union_point(v))
    }

    pub fn geometric_normal(&self, triangle: u32) -> Vec3 {
        self.tri_normals[triangle as usize]
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn vertex(&self, index: u32) -> Vec3 {
        self.vertices[index as usize]
    }

    pub fn triangle_area(&self, triangle: u32) -> f32 {
        let t = self.triangles[triangle as usize];
        let (a, b, c) = (self.vertices[t[0] as usize], self.vertices[t[1] as usize], self.vertices[t[2] as usize]);
        0.5 * (b - a).cross(c - a).length()
    }

    fn moller_trumbore(tri: &TriPrim, ray: &Ray) -> Option<(f32, f32, f32)> {
        const EPS: f32 = 1e-8;
        let e1 = tri.v1 - tri.v0;
        let e2 = tri.v2 - tri.v0;
        let pvec = ray.direction.cross(e2);
        let det = e1.dot(pvec);
        if det.abs() < EPS {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = ray.origin - tri.v0;
        let u = tvec.dot(pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(e1);
        let v = ray.direction.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(qvec) * inv_det;
        if t <= ray.mint || t >= ray.maxt {
            return None;
        }
        Some((t, 1.0 - u - v, u))
    }

    /// Intersect in this mesh's local space. Bevel rounding, if configured,
    /// replaces the flat-triangle hit point and normal with the rounded
    /// capsule surface whenever the ray passes nearer the edge than the
    /// flat hit (`continue_to_trace` in the original renders as: a ray that
    /// enters the bounding capsule but misses the capsule surface keeps
    /// searching past this triangle rather than accepting the flat hit).
    pub fn intersect(&self, ray: &Ray) -> Option<(MeshHit, Vec3, Vec3)> {
        let mut working = *ray;
        loop {
            let hit = self.bvh.intersect(&self.prims, &working, |tri, r| Self::moller_trumbore(tri, r).map(|(t, _, _)| t));
            let (idx, t) = hit?;
            let (_, b1, b2) = Self::moller_trumbore(&self.prims[idx as usize], &{
                let mut r = working;
                r.maxt = t + 1e-4;
                r
            })?;
            let b0 = 1.0 - b1 - b2;
            let mesh_hit = MeshHit { t, triangle: idx, b0, b1, b2 };

            if let Some(bevel) = &self.bevel {
                let (continue_to_trace, rounded) = bevel.intersect(&working, t);
                if let Some((_point, normal)) = rounded {
                    return Some((mesh_hit, normal, self.tri_normals[idx as usize]));
                }
                if continue_to_trace {
                    working.mint = t + 1e-4;
                    continue;
                }
            }
            let n = self.shading_normal(&mesh_hit);
            return Some((mesh_hit, n, self.tri_normals[idx as usize]));
        }
    }

    pub fn shading_normal(&self, hit: &MeshHit) -> Vec3 {
        match &self.normals {
            Some(normals) => {
                let t = self.triangles[hit.triangle as usize];
                (normals[t[0] as usize] * hit.b0 + normals[t[1] as usize] * hit.b1 + normals[t[2] as usize] * hit.b2)
                    .normalize_or(self.tri_normals[hit.triangle as usize])
            }
            None => self.tri_normals[hit.triangle as usize],
        }
    }

    pub fn interpolate_uv(&self, channel: usize, hit: &MeshHit) -> Vec2 {
        let Some(channel_data) = self.uv_channels.get(channel) else { return Vec2::ZERO };
        let t = self.triangles[hit.triangle as usize];
        channel_data[t[0] as usize] * hit.b0 + channel_data[t[1] as usize] * hit.b1 + channel_data[t[2] as usize] * hit.b2
    }

    pub fn interpolate_color(&self, channel: usize, hit: &MeshHit) -> Spectrum {
        let Some(channel_data) = self.color_channels.get(channel) else { return Spectrum::WHITE };
        let t = self.triangles[hit.triangle as usize];
        channel_data[t[0] as usize] * hit.b0 + channel_data[t[1] as usize] * hit.b1 + channel_data[t[2] as usize] * hit.b2
    }

    pub fn surface_point(&self, hit: &MeshHit) -> Vec3 {
        let t = self.triangles[hit.triangle as usize];
        self.vertices[t[0] as usize] * hit.b0 + self.vertices[t[1] as usize] * hit.b1 + self.vertices[t[2] as usize] * hit.b2
    }
}

/// A scene object: either a standalone mesh or a transformed instance of a
/// shared base mesh. Distinct from a raw pointer to a (possibly edited)
/// base, an instance owns a reference-counted handle, so concurrent render
/// threads never observe a half-mutated base mesh mid-edit.
pub enum MeshRef {
    Base(Arc<TriangleMesh>),
    Instance { base: Arc<TriangleMesh>, transform: Transform },
}

impl MeshRef {
    pub fn bounds(&self) -> Bounds3 {
        match self {
            MeshRef::Base(m) => m.bounds(),
            MeshRef::Instance { base, transform } => {
                let b = base.bounds();
                let mut out = Bounds3::EMPTY;
                for corner in [
                    Vec3::new(b.min.x, b.min.y, b.min.z),
                    Vec3::new(b.max.x, b.min.y, b.min.z),
                    Vec3::new(b.min.x, b.max.y, b.min.z),
                    Vec3::new(b.max.x, b.max.y, b.min.z),
                    Vec3::new(b.min.x, b.min.y, b.max.z),
                    Vec3::new(b.max.x, b.min.y, b.max.z),
                    Vec3::new(b.min.x, b.max.y, b.max.z),
                    Vec3::new(b.max.x, b.max.y, b.max.z),
                ] {
                    out = out.union_point(transform.transform_point(corner));
                }
                out
            }
        }
    }

    pub fn mesh(&self) -> &TriangleMesh {
        match self {
            MeshRef::Base(m) => m,
            MeshRef::Instance { base, .. } => base,
        }
    }

    /// Intersect in world space: instances transform the ray into local
    /// space and the resulting normals back into world space.
    pub fn intersect(&self, world_ray: &Ray) -> Option<(MeshHit, Vec3, Vec3)> {
        match self {
            MeshRef::Base(m) => m.intersect(world_ray),
            MeshRef::Instance { base, transform } => {
                let local_ray = world_ray.transformed(transform);
                base.intersect(&local_ray).map(|(hit, ns, ng)| {
                    (hit, transform.transform_normal(ns).normalize_or_zero(), transform.transform_normal(ng).normalize_or_zero())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle() -> TriangleMesh {
        let vertices = vec![Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        TriangleMesh::build(vertices, vec![[0, 1, 2]], None, vec![], vec![], vec![], 0.0).unwrap()
    }

    #[test]
    fn ray_through_triangle_hits() {
        let mesh = single_triangle();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let hit = mesh.intersect(&ray);
        assert!(hit.is_some());
        let (h, _, _) = hit.unwrap();
        assert!((h.t - 5.0).abs() < 1e-4);
    }

    #[test]
    fn ray_missing_triangle_misses() {
        let mesh = single_triangle();
        let ray = Ray::new(Vec3::new(10.0, 10.0, -5.0), Vec3::Z);
        assert!(mesh.intersect(&ray).is_none());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let err = TriangleMesh::build(vertices, vec![[0, 1, 5]], None, vec![], vec![], vec![], 0.0);
        assert!(err.is_err());
    }

    #[test]
    fn instance_transforms_hit_normal() {
        let base = Arc::new(single_triangle());
        let instance = MeshRef::Instance { base, transform: Transform::from_translation(Vec3::new(0.0, 0.0, 10.0)) };
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        let hit = instance.intersect(&ray);
        assert!(hit.is_some());
        let (h, _, _) = hit.unwrap();
        assert!((h.t - 5.0).abs() < 1e-3);
    }
}
