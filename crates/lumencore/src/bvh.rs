//! # Index BVH — a generic bounding-volume hierarchy
//!
//! One BVH implementation backs three different callers: the mesh
//! triangle/bevel-cylinder intersection layer, and the direct-lighting cache
//! index. Rather than a vtable hierarchy per payload kind, the tree is
//! generic over any payload exposing [`Bounded`] (and, for the cache-style
//! nearest/radius queries, [`SpatialEntry`]).
//!
//! ## Node layout
//!
//! Nodes are flattened into one array in depth-first order, matching the
//! "32-byte record" framing from the design:
//!
//! ```text
//! ┌───────────────┬───────────────┬────────────┐
//! │ bbox_min[3]   │ bbox_max[3]   │ node_data  │
//! └───────────────┴───────────────┴────────────┘
//! ```
//!
//! Interior nodes store a `skip_index`: the index to jump to when the ray or
//! query point misses this node's box. Leaves store a packed
//! `(first_prim, prim_count)` pair with the high bit of `node_data`'s first
//! word set as the leaf sentinel. Traversal is iterative: on a miss, jump to
//! `skip_index`; on a hit (interior), just advance to `current + 1` (its
//! first child is always the very next node in depth-first order).
//!
//! Build quality (we use a deterministic max-extent-axis median split, not a
//! full SAH) affects traversal speed only — per the design, query
//! correctness never depends on it.

use crate::math::Bounds3;

/// Anything that can report an axis-aligned bound, the minimum a BVH payload
/// needs.
pub trait Bounded {
    fn bounds(&self) -> Bounds3;
}

/// A payload that can additionally answer the cache-style point queries used
/// by the direct-lighting sampling cache: nearest shading-point entry, and
/// all entries within a radius.
pub trait SpatialEntry: Bounded {
    fn point(&self) -> glam::Vec3;
    fn normal(&self) -> glam::Vec3;
    fn is_volume(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
enum NodeData {
    /// Index of the node to resume at when this subtree is rejected.
    Interior { skip_index: u32 },
    /// `prim_indices[first..first + count]` are the primitives in this leaf.
    Leaf { first: u32, count: u32 },
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Bounds3,
    data: NodeData,
}

/// A built BVH over an externally owned primitive slice. The tree stores
/// only bounds and an index permutation; it borrows nothing from the
/// primitives and is immutable once built, so it is trivially `Send + Sync`
/// and safe to share across render-worker threads.
#[derive(Debug, Clone)]
pub struct IndexBvh {
    nodes: Vec<BvhNode>,
    /// Permutation of primitive indices; leaves reference contiguous ranges
    /// of this array.
    prim_indices: Vec<u32>,
}

const LEAF_SIZE: usize = 4;

impl IndexBvh {
    pub fn empty() -> Self {
        IndexBvh { nodes: Vec::new(), prim_indices: Vec::new() }
    }

    /// Build a BVH over `prims`, identified afterwards by their index into
    /// that same slice. Deterministic: the same input order always produces
    /// the same tree, independent of thread count during any parallel
    /// bound-computation the caller may have done beforehand.
    pub fn build<P: Bounded>(prims: &[P]) -> Self {
        if prims.is_empty() {
            return Self::empty();
        }
        let mut indices: Vec<u32> = (0..prims.len() as u32).collect();
        let mut nodes = Vec::new();
        let len = indices.len();
        Self::build_recursive(prims, &mut indices, 0, len, &mut nodes);
        IndexBvh { nodes, prim_indices: indices }
    }

    /// Builds the subtree over `indices[base..base + len]` in place,
    /// appending nodes to `nodes`. `base` is the absolute offset of this
    /// slice within the final `prim_indices` array, needed because leaves
    /// must record where their primitives live in that flat array.
    fn build_recursive<P: Bounded>(
        prims: &[P],
        indices: &mut [u32],
        base: usize,
        len: usize,
        nodes: &mut Vec<BvhNode>,
    ) -> u32 {
        let slice = &mut indices[base..base + len];
        let bounds = slice.iter().map(|&i| prims[i as usize].bounds()).fold(Bounds3::EMPTY, |a, b| a.union(&b));

        let this_index = nodes.len() as u32;

        if len <= LEAF_SIZE {
            nodes.push(BvhNode {
                bounds,
                data: NodeData::Leaf { first: base as u32, count: len as u32 },
            });
            return this_index;
        }

        let axis = bounds.max_extent_axis();
        slice.sort_by(|&a, &b| {
            let ca = prims[a as usize].bounds().centroid()[axis];
            let cb = prims[b as usize].bounds().centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = len / 2;

        nodes.push(BvhNode { bounds, data: NodeData::Interior { skip_index: 0 } });
        Self::build_recursive(prims, indices, base, mid, nodes);
        Self::build_recursive(prims, indices, base + mid, len - mid, nodes);
        let after_subtree = nodes.len() as u32;
        nodes[this_index as usize].data = NodeData::Interior { skip_index: after_subtree };
        this_index
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate the primitive indices of every leaf whose box the ray
    /// intersects, in the stackless skip-index order described above.
    pub fn for_each_ray_candidate(
        &self,
        origin: glam::Vec3,
        inv_dir: glam::Vec3,
        mint: f32,
        maxt: f32,
        mut visit: impl FnMut(u32),
    ) {
        if self.nodes.is_empty() {
            return;
        }
        let mut i = 0usize;
        while i < self.nodes.len() {
            let node = &self.nodes[i];
            if !node.bounds.intersect_ray(origin, inv_dir, mint, maxt) {
                match node.data {
                    NodeData::Interior { skip_index } => i = skip_index as usize,
                    NodeData::Leaf { .. } => i += 1,
                }
                continue;
            }
            match node.data {
                NodeData::Interior { .. } => i += 1,
                NodeData::Leaf { first, count } => {
                    for k in 0..count {
                        visit(self.prim_indices[first as usize + k as usize]);
                    }
                    i += 1;
                }
            }
        }
    }

    fn for_each_point_candidate(&self, p: glam::Vec3, radius: f32, mut visit: impl FnMut(u32)) {
        if self.nodes.is_empty() {
            return;
        }
        let query_box = crate::math::Bounds3 { min: p - glam::Vec3::splat(radius), max: p + glam::Vec3::splat(radius) };
        let mut i = 0usize;
        while i < self.nodes.len() {
            let node = &self.nodes[i];
            let overlaps = node.bounds.min.x <= query_box.max.x
                && node.bounds.max.x >= query_box.min.x
                && node.bounds.min.y <= query_box.max.y
                && node.bounds.max.y >= query_box.min.y
                && node.bounds.min.z <= query_box.max.z
                && node.bounds.max.z >= query_box.min.z;
            if !overlaps {
                match node.data {
                    NodeData::Interior { skip_index } => i = skip_index as usize,
                    NodeData::Leaf { .. } => i += 1,
                }
                continue;
            }
            match node.data {
                NodeData::Interior { .. } => i += 1,
                NodeData::Leaf { first, count } => {
                    for k in 0..count {
                        visit(self.prim_indices[first as usize + k as usize]);
                    }
                    i += 1;
                }
            }
        }
    }

    /// Ray-cast this BVH, calling `test(prim_index, ray)` for each candidate
    /// leaf primitive and keeping the minimal accepted `t`. `test` returns
    /// `Some(t)` on a hit within the ray's current `[mint, maxt)`.
    pub fn intersect<P>(
        &self,
        prims: &[P],
        ray: &crate::math::Ray,
        mut test: impl FnMut(&P, &crate::math::Ray) -> Option<f32>,
    ) -> Option<(u32, f32)> {
        let inv_dir = ray.inv_direction();
        let mut best: Option<(u32, f32)> = None;
        let mut current_maxt = ray.maxt;
        self.for_each_ray_candidate(ray.origin, inv_dir, ray.mint, current_maxt, |idx| {
            let mut r = *ray;
            r.maxt = current_maxt;
            if let Some(t) = test(&prims[idx as usize], &r) {
                if t < current_maxt {
                    current_maxt = t;
                    best = Some((idx, t));
                }
            }
        });
        best
    }

    /// Nearest entry to `(p, n, is_volume)` whose normal is within
    /// `normal_angle_limit` radians of `n` and whose volume flag matches.
    /// Correctness is independent of tree build quality: every leaf whose
    /// box could contain a closer candidate than the current best is still
    /// visited, because `for_each_point_candidate` walks every node
    /// overlapping the search radius, not just the first hit.
    pub fn nearest<P: SpatialEntry>(
        &self,
        prims: &[P],
        p: glam::Vec3,
        n: glam::Vec3,
        is_volume: bool,
        normal_angle_limit: f32,
    ) -> Option<u32> {
        let cos_limit = normal_angle_limit.cos();
        // Expanding-radius search: start from the tree's own extent so the
        // first pass usually finds a candidate in one walk, then verify no
        // closer one hides just outside by re-querying with the found
        // distance as the new radius.
        let mut radius = self.root_bounds().map(|b| b.diagonal().length()).unwrap_or(1.0);
        for _ in 0..32 {
            let mut best: Option<(u32, f32)> = None;
            self.for_each_point_candidate(p, radius, |idx| {
                let e = &prims[idx as usize];
                if e.is_volume() != is_volume {
                    return;
                }
                if e.normal().dot(n) < cos_limit {
                    return;
                }
                let d = (e.point() - p).length();
                if d <= radius && best.map(|(_, bd)| d < bd).unwrap_or(true) {
                    best = Some((idx, d));
                }
            });
            if let Some((_, d)) = best {
                // Re-verify with exactly the found distance to guarantee no
                // closer candidate was excluded by an earlier, larger radius
                // rounding error.
                let mut confirmed = best;
                self.for_each_point_candidate(p, d + 1e-4, |cand| {
                    let e = &prims[cand as usize];
                    if e.is_volume() != is_volume || e.normal().dot(n) < cos_limit {
                        return;
                    }
                    let cd = (e.point() - p).length();
                    if confirmed.map(|(_, bd)| cd < bd).unwrap_or(true) {
                        confirmed = Some((cand, cd));
                    }
                });
                return confirmed.map(|(i, _)| i);
            }
            if radius <= 0.0 {
                break;
            }
            radius *= 2.0;
        }
        None
    }

    pub fn within_radius<P: SpatialEntry>(
        &self,
        prims: &[P],
        p: glam::Vec3,
        n: glam::Vec3,
        is_volume: bool,
        look_up_radius: f32,
        normal_angle_limit: f32,
    ) -> Vec<u32> {
        let cos_limit = normal_angle_limit.cos();
        let mut out = Vec::new();
        self.for_each_point_candidate(p, look_up_radius, |idx| {
            let e = &prims[idx as usize];
            if e.is_volume() != is_volume {
                return;
            }
            if e.normal().dot(n) < cos_limit {
                return;
            }
            if (e.point() - p).length() <= look_up_radius {
                out.push(idx);
            }
        });
        out
    }

    fn root_bounds(&self) -> Option<Bounds3> {
        self.nodes.first().map(|n| n.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    struct Point(Vec3, Vec3, bool);
    impl Bounded for Point {
        fn bounds(&self) -> Bounds3 {
            Bounds3::point(self.0)
        }
    }
    impl SpatialEntry for Point {
        fn point(&self) -> Vec3 {
            self.0
        }
        fn normal(&self) -> Vec3 {
            self.1
        }
        fn is_volume(&self) -> bool {
            self.2
        }
    }

    fn brute_force_nearest(pts: &[Point], p: Vec3, n: Vec3, is_volume: bool, angle_limit: f32) -> Option<u32> {
        let cos_limit = angle_limit.cos();
        pts.iter()
            .enumerate()
            .filter(|(_, e)| e.is_volume() == is_volume && e.normal().dot(n) >= cos_limit)
            .min_by(|(_, a), (_, b)| {
                (a.point() - p).length().partial_cmp(&(b.point() - p).length()).unwrap()
            })
            .map(|(i, _)| i as u32)
    }

    #[test]
    fn nearest_matches_linear_scan() {
        let mut pts = Vec::new();
        for i in 0..200 {
            let x = (i as f32 * 0.37).sin() * 10.0;
            let y = (i as f32 * 1.7).cos() * 10.0;
            let z = (i as f32 * 0.11).sin() * 10.0;
            pts.push(Point(Vec3::new(x, y, z), Vec3::Y, i % 3 == 0));
        }
        let bvh = IndexBvh::build(&pts);
        for query in [Vec3::ZERO, Vec3::new(5.0, 5.0, 5.0), Vec3::new(-3.0, 2.0, 8.0)] {
            let got = bvh.nearest(&pts, query, Vec3::Y, false, std::f32::consts::FRAC_PI_2);
            let want = brute_force_nearest(&pts, query, Vec3::Y, false, std::f32::consts::FRAC_PI_2);
            assert_eq!(got, want, "mismatch at query {query:?}");
        }
    }

    #[test]
    fn within_radius_matches_linear_scan() {
        let mut pts = Vec::new();
        for i in 0..64 {
            pts.push(Point(Vec3::new(i as f32, 0.0, 0.0), Vec3::Y, false));
        }
        let bvh = IndexBvh::build(&pts);
        let got: std::collections::HashSet<u32> =
            bvh.within_radius(&pts, Vec3::new(10.0, 0.0, 0.0), Vec3::Y, false, 3.5, std::f32::consts::PI).into_iter().collect();
        let want: std::collections::HashSet<u32> = pts
            .iter()
            .enumerate()
            .filter(|(_, p)| (p.point() - Vec3::new(10.0, 0.0, 0.0)).length() <= 3.5)
            .map(|(i, _)| i as u32)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn empty_bvh_yields_no_candidates() {
        let pts: Vec<Point> = Vec::new();
        let bvh = IndexBvh::build(&pts);
        assert!(bvh.is_empty());
        assert_eq!(bvh.nearest(&pts, Vec3::ZERO, Vec3::Y, false, 1.0), None);
    }
}
