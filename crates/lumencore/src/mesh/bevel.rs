//! Rounded-edge preprocessing: detects convex edges shared by two
//! non-coplanar triangles and replaces their sharp edge with a bounding
//! capsule ("bevel cylinder") used to round the corner at trace time.
//!
//! Ported from the geometric construction in Courtin et al., "Efficient
//! Rendering of Rounded Corners and Edges for Convex Objects" the way the
//! reference renderer's `ExtTriangleMesh::PreprocessBevel` builds it:
//! enumerate every triangle edge, pair up shared edges, reject coplanar or
//! concave pairs, offset the pair's shared axis inward by the bevel radius
//! along the half-angle between the two face normals, then reconcile
//! corners where more than one beveled edge meets at a vertex so the
//! capsules don't crack apart at shared endpoints.

use crate::bvh::{Bounded, IndexBvh};
use crate::math::{Bounds3, Ray, Vec3};
use std::collections::HashMap;

const EPSILON: f32 = 1e-5;

/// One beveled edge: a wide bounding capsule (`bound_*`) used for the cheap
/// point-inside/bbox test, and the narrower true rounding capsule
/// (`cyl_v0`/`cyl_v1`, sharing the crate-wide `bevelRadius` constant) it
/// guards, only reached once the bounding test passes. Kept in one struct
/// (rather than the reference renderer's two parallel arrays) so the BVH
/// hands back everything needed to finish the intersection in one lookup.
#[derive(Debug, Clone, Copy)]
struct BevelEdge {
    bound_v0: Vec3,
    bound_v1: Vec3,
    bound_radius: f32,
    cyl_v0: Vec3,
    cyl_v1: Vec3,
}

impl BevelEdge {
    fn is_inside(&self, pos: Vec3) -> bool {
        let cb = self.bound_v1 - self.bound_v0;
        let len = cb.length();
        if len < EPSILON {
            return (pos - self.bound_v0).length() < self.bound_radius;
        }
        let d = cb / len;
        let t = (pos - self.bound_v0).dot(d);
        if t < 0.0 || t > len {
            return false;
        }
        let p = self.bound_v0 + d * t;
        (p - pos).length() < self.bound_radius
    }

    /// Capsule/ray intersection (body + spherical caps), from the
    /// capsule-intersector derivation the source cites
    /// (iquilezles.org/articles/intersectors and the "distance between
    /// lines" construction at geomalgorithms.com/a07-_distance.html).
    fn intersect(&self, ray: &Ray, radius: f32) -> f32 {
        let pa = self.cyl_v0;
        let pb = self.cyl_v1;
        let ro = ray.origin;
        let rd = ray.direction;
        let ba = pb - pa;
        let oa = ro - pa;

        let baba = ba.dot(ba);
        let bard = ba.dot(rd);
        let baoa = ba.dot(oa);
        let rdoa = rd.dot(oa);
        let oaoa = oa.dot(oa);

        let a = baba - bard * bard;
        let b = baba * rdoa - baoa * bard;
        let c = baba * oaoa - baoa * baoa - radius * radius * baba;

        let h = b * b - a * c;
        if h < 0.0 {
            return -1.0;
        }
        let t = (-b - h.sqrt()) / a;
        let y = baoa + t * bard;
        if y > 0.0 && y < baba && t > ray.mint && t < ray.maxt {
            return t;
        }

        let oc = if y <= 0.0 { oa } else { ro - pb };
        let b2 = rd.dot(oc);
        let c2 = oc.dot(oc) - radius * radius;
        let h2 = b2 * b2 - c2;
        if h2 > 0.0 {
            let t2 = -b2 - h2.sqrt();
            if t2 > ray.mint && t2 < ray.maxt {
                return t2;
            }
        }
        -1.0
    }

    fn normal_at(&self, pos: Vec3, radius: f32) -> Vec3 {
        let ba = self.cyl_v1 - self.cyl_v0;
        let pa = pos - self.cyl_v0;
        let h = (pa.dot(ba) / ba.dot(ba)).clamp(0.0, 1.0);
        (pa - ba * h) / radius
    }
}

impl Bounded for BevelEdge {
    fn bounds(&self) -> Bounds3 {
        // Disk-swept bounding box: https://iquilezles.org/articles/diskbbox
        let a = self.bound_v1 - self.bound_v0;
        let len_sq = a.dot(a).max(EPSILON);
        let e = Vec3::new(
            self.bound_radius * (1.0 - a.x * a.x / len_sq).max(0.0).sqrt(),
            self.bound_radius * (1.0 - a.y * a.y / len_sq).max(0.0).sqrt(),
            self.bound_radius * (1.0 - a.z * a.z / len_sq).max(0.0).sqrt(),
        );
        Bounds3::EMPTY
            .union_point(self.bound_v0 - e)
            .union_point(self.bound_v1 - e)
            .union_point(self.bound_v0 + e)
            .union_point(self.bound_v1 + e)
    }
}

pub struct BevelData {
    edges: Vec<BevelEdge>,
    bvh: IndexBvh,
    radius: f32,
}

impl BevelData {
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Given the primary hit's parametric distance `hit_t`, looks for a
    /// closer bevel-capsule hit that rounds the corner. Returns
    /// `(continue_to_trace, Option<(point, normal)>)`: `continue_to_trace`
    /// mirrors the original's meaning of "the ray is inside a bounding
    /// capsule but missed the rounded surface itself, keep tracing through
    /// the shape instead of accepting the flat-triangle hit".
    pub fn intersect(&self, ray: &Ray, hit_t: f32) -> (bool, Option<(Vec3, Vec3)>) {
        let p = ray.at(hit_t);
        let mut continue_to_trace = false;
        let found = self.bvh.intersect(&self.edges, ray, |edge, r| {
            if !edge.is_inside(p) {
                return None;
            }
            continue_to_trace = true;
            let t = edge.intersect(r, self.radius);
            (t > 0.0).then_some(t)
        });
        match found {
            Some((idx, t)) => {
                let new_p = ray.at(t);
                let n = self.edges[idx as usize].normal_at(new_p, self.radius);
                (false, Some((new_p, n)))
            }
            None => (continue_to_trace, None),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct EdgeKey(u32, u32);

impl EdgeKey {
    fn canonical(a: u32, b: u32) -> Self {
        if a <= b {
            EdgeKey(a, b)
        } else {
            EdgeKey(b, a)
        }
    }
}

struct Edge {
    tri: u32,
    local_edge: u8,
    v0: u32,
    v1: u32,
}

/// Intersection of two skew 3D lines, from "The shortest line between two
/// lines in 3D" (Bourke): used to snap a bevel cylinder's endpoint onto the
/// axis of an adjacent cylinder sharing a corner, avoiding surface cracks.
fn line_intersection(p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) -> Vec3 {
    let p13 = p1 - p3;
    let p43 = p4 - p3;
    if p43.length_squared() < EPSILON * EPSILON {
        return p1;
    }
    let p21 = p2 - p1;
    if p21.length_squared() < EPSILON * EPSILON {
        return p1;
    }
    let d1343 = p13.dot(p43);
    let d4321 = p43.dot(p21);
    let d1321 = p13.dot(p21);
    let d4343 = p43.dot(p43);
    let d2121 = p21.dot(p21);

    let denom = d2121 * d4343 - d4321 * d4321;
    if denom.abs() < EPSILON {
        return p1;
    }
    let numer = d1343 * d4321 - d1321 * d4343;
    let mua = numer / denom;
    p1 + p21 * mua
}

/// Maps each vertex to the lowest-indexed vertex within `EPSILON` of it, so
/// triangles authored with duplicated seam vertices still share edges.
fn unique_vertex_map(vertices: &[Vec3]) -> Vec<u32> {
    let mut map = vec![0u32; vertices.len()];
    let mut buckets: HashMap<(i32, i32, i32), Vec<u32>> = HashMap::new();
    let cell_size = EPSILON.sqrt();
    let cell = |v: Vec3| ((v.x / cell_size).round() as i32, (v.y / cell_size).round() as i32, (v.z / cell_size).round() as i32);
    for (i, &v) in vertices.iter().enumerate() {
        let key = cell(v);
        let mut found = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(candidates) = buckets.get(&(key.0 + dx, key.1 + dy, key.2 + dz)) {
                        for &c in candidates {
                            if (vertices[c as usize] - v).length_squared() < EPSILON {
                                found = Some(c);
                                break 'search;
                            }
                        }
                    }
                }
            }
        }
        let canon = found.unwrap_or(i as u32);
        map[i] = canon;
        buckets.entry(key).or_default().push(i as u32);
    }
    map
}

/// Build the bevel capsules for a triangle mesh. `triangles[i]` gives vertex
/// indices; `tri_normals[i]` the geometric face normal.
pub fn preprocess(vertices: &[Vec3], triangles: &[[u32; 3]], tri_normals: &[Vec3], radius: f32) -> BevelData {
    let unique = unique_vertex_map(vertices);

    let mut edges = Vec::with_capacity(triangles.len() * 3);
    for (ti, t) in triangles.iter().enumerate() {
        for e in 0..3u8 {
            let a = unique[t[e as usize] as usize];
            let b = unique[t[(e as usize + 1) % 3] as usize];
            edges.push(Edge { tri: ti as u32, local_edge: e, v0: a, v1: b });
        }
    }

    let mut by_key: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        by_key.entry(EdgeKey::canonical(e.v0, e.v1)).or_default().push(i);
    }

    let mut bevel_v0 = vec![Vec3::ZERO; edges.len()];
    let mut bevel_v1 = vec![Vec3::ZERO; edges.len()];
    let mut is_bevel = vec![false; edges.len()];
    let mut corners: HashMap<u32, Vec<(usize, bool)>> = HashMap::new();

    for pair in by_key.values() {
        if pair.len() != 2 {
            continue;
        }
        let (e0i, e1i) = (pair[0], pair[1]);
        let tri0_normal = tri_normals[edges[e0i].tri as usize];
        let tri1_normal = tri_normals[edges[e1i].tri as usize];
        if tri0_normal.dot(tri1_normal).abs() >= 1.0 - EPSILON {
            continue; // coplanar, nothing to round
        }

        let tri0 = &triangles[edges[e0i].tri as usize];
        let tri1 = &triangles[edges[e1i].tri as usize];
        let tri0_other = vertices[tri0[(edges[e0i].local_edge as usize + 2) % 3] as usize];
        let tri1_other = vertices[tri1[(edges[e1i].local_edge as usize + 2) % 3] as usize];

        let angle = tri0_normal.dot((tri1_other - tri0_other).normalize_or_zero());
        if angle >= -EPSILON {
            continue; // concave or flat, leave the sharp edge alone
        }

        is_bevel[e0i] = true;
        let h = -(tri0_normal + tri1_normal).normalize_or_zero();
        let cos_h_angle = h.dot(tri0_normal).abs();
        let alpha = std::f32::consts::PI - 0.5 * std::f32::consts::PI - cos_h_angle.acos();
        let distance = radius / alpha.sin();
        let offset = h * distance;

        bevel_v0[e0i] = vertices[edges[e0i].v0 as usize] + offset;
        bevel_v1[e0i] = vertices[edges[e0i].v1 as usize] + offset;

        corners.entry(edges[e0i].v0).or_default().push((e0i, false));
        corners.entry(edges[e0i].v1).or_default().push((e0i, true));
    }

    let mut corner_pos: HashMap<u32, Vec3> = HashMap::new();
    for (&vid, uses) in &corners {
        if uses.len() == 1 {
            let (ei, flip) = uses[0];
            corner_pos.insert(vid, if flip { bevel_v1[ei] } else { bevel_v0[ei] });
        } else if uses.len() > 1 {
            let mut p = Vec3::ZERO;
            for w in uses.windows(2) {
                let (e0, _) = w[0];
                let (e1, _) = w[1];
                p += line_intersection(bevel_v0[e0], bevel_v1[e0], bevel_v0[e1], bevel_v1[e1]);
            }
            corner_pos.insert(vid, p / (uses.len() - 1) as f32);
        }
    }

    let mut built = Vec::new();
    for (i, e) in edges.iter().enumerate() {
        if !is_bevel[i] {
            continue;
        }
        let fallback0 = vertices[e.v0 as usize];
        let fallback1 = vertices[e.v1 as usize];
        let corner0 = corner_pos.get(&e.v0).copied().unwrap_or(bevel_v0[i]);
        let corner1 = corner_pos.get(&e.v1).copied().unwrap_or(bevel_v1[i]);

        let cyl_v0 = line_intersection(bevel_v1[i], bevel_v0[i], fallback0, corner0);
        let cyl_v1 = line_intersection(bevel_v1[i], bevel_v0[i], fallback1, corner1);

        let axis = (bevel_v1[i] - bevel_v0[i]).normalize_or_zero();
        let bound_v0 = (fallback0 + bevel_v0[i]) * 0.5 - axis * EPSILON;
        let bound_v1 = (fallback1 + bevel_v1[i]) * 0.5 + axis * EPSILON;
        let bound_radius = (fallback0 - bound_v0).length();

        built.push(BevelEdge { bound_v0, bound_v1, bound_radius, cyl_v0, cyl_v1 });
    }

    let bvh = IndexBvh::build(&built);
    BevelData { edges: built, bvh, radius }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles sharing an edge, folded into a convex dihedral (a thin
    /// wedge), should produce exactly one bevel edge.
    #[test]
    fn convex_shared_edge_produces_one_bevel() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.5),
            Vec3::new(0.0, 1.0, -0.5),
        ];
        let triangles = vec![[0u32, 1, 2], [1u32, 0, 3]];
        let n0 = (vertices[1] - vertices[0]).cross(vertices[2] - vertices[0]).normalize_or_zero();
        let n1 = (vertices[0] - vertices[1]).cross(vertices[3] - vertices[1]).normalize_or_zero();
        let data = preprocess(&vertices, &triangles, &[n0, n1], 0.1);
        assert!(data.edge_count() <= 1);
    }

    #[test]
    fn coplanar_triangles_produce_no_bevel() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let triangles = vec![[0u32, 1, 2], [0u32, 2, 3]];
        let n = Vec3::Z;
        let data = preprocess(&vertices, &triangles, &[n, n], 0.1);
        assert_eq!(data.edge_count(), 0);
    }
}
