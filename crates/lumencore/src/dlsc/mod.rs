//! # Direct-Lighting Sampling Cache
//!
//! A spatial cache of per-location light-sampling distributions, built once
//! per scene edit and queried on the path tracer's hot path instead of
//! re-deriving a light distribution at every shading point. Entries are
//! payloads of the same generic [`crate::bvh::IndexBvh`] the mesh and scene
//! layers already use for ray/point queries — one BVH implementation, one
//! more payload type, rather than a cache-specific tree.
//!
//! Build proceeds in the stages the design lays out: visibility sampling,
//! radius estimation, clustering, per-entry sampling, distribution
//! construction, and indexing. The first and fourth stages are
//! embarrassingly parallel over candidate points and run on `rayon`.

pub mod persist;

use crate::bvh::{Bounded, IndexBvh, SpatialEntry};
use crate::distribution::Distribution1D;
use crate::math::{Bounds3, Ray, Vec3};
use crate::scene::{LightId, Scene};
use rayon::prelude::*;

/// A candidate shading point gathered by a pilot pass (camera or light
/// tracing) before the cache is built. The cache itself never generates
/// these; it only clusters and samples the ones it is handed.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceSample {
    pub point: Vec3,
    pub normal: Vec3,
    pub is_volume: bool,
}

#[derive(Debug, Clone)]
pub struct DlscParams {
    /// `lookUpRadius`: the per-entry influence radius to use directly. Zero
    /// means derive it automatically so the radius achieves
    /// [`DlscParams::target_hit_rate`] over the candidate particles.
    pub look_up_radius: f32,
    /// `targetHitRate`: used only when `look_up_radius == 0.0`. The fraction
    /// of candidate particles that must have another compatible particle
    /// within the derived radius.
    pub target_hit_rate: f32,
    /// Shadow rays traced per light during per-entry sampling.
    pub samples_per_entry: usize,
    /// Max angle (radians) between a query normal and an entry's normal for
    /// the entry to be considered a match.
    pub normal_angle_limit: f32,
}

impl Default for DlscParams {
    fn default() -> Self {
        DlscParams { look_up_radius: 0.0, target_hit_rate: 0.99, samples_per_entry: 32, normal_angle_limit: std::f32::consts::FRAC_PI_2 }
    }
}

/// Smallest radius such that `target_hit_rate` of `candidates` have another
/// compatible (same volume-ness, same-hemisphere normal) candidate within
/// that radius — the nearest-neighbor-distance percentile that stands in for
/// particles at build time, matching spec wording that the radius must
/// "achieve `targetHitRate` over the particles". Falls back to `max_radius`
/// when fewer than two candidates share a hemisphere (no neighbor to find).
fn derive_radius_from_hit_rate(candidates: &[SurfaceSample], target_hit_rate: f32, max_radius: f32) -> f32 {
    let mut nearest: Vec<f32> = candidates
        .iter()
        .map(|sample| {
            candidates
                .iter()
                .filter(|other| {
                    !std::ptr::eq(*other, sample) && other.is_volume == sample.is_volume && other.normal.dot(sample.normal) > 0.0
                })
                .map(|other| (other.point - sample.point).length())
                .fold(f32::INFINITY, f32::min)
        })
        .filter(|d| d.is_finite())
        .collect();
    if nearest.is_empty() {
        return max_radius;
    }
    nearest.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rate = target_hit_rate.clamp(0.0, 1.0);
    let idx = ((nearest.len() as f32 * rate).ceil() as usize).saturating_sub(1).min(nearest.len() - 1);
    nearest[idx].min(max_radius)
}

struct DlscEntry {
    point: Vec3,
    normal: Vec3,
    is_volume: bool,
    radius: f32,
    distribution: Distribution1D,
}

impl Bounded for DlscEntry {
    fn bounds(&self) -> Bounds3 {
        Bounds3::point(self.point).expand(self.radius)
    }
}

impl SpatialEntry for DlscEntry {
    fn point(&self) -> Vec3 {
        self.point
    }
    fn normal(&self) -> Vec3 {
        self.normal
    }
    fn is_volume(&self) -> bool {
        self.is_volume
    }
}

/// The built cache: clustered entries indexed in a BVH, plus a global
/// fallback distribution for points the cache has no nearby entry for.
pub struct DirectLightSamplingCache {
    entries: Vec<DlscEntry>,
    bvh: IndexBvh,
    global_distribution: Distribution1D,
    params: DlscParams,
}

/// Per-candidate visibility estimate against every light: the fraction of
/// `samples_per_entry` shadow rays that reached the light unoccluded,
/// weighted by the light's unoccluded radiance contribution. This is the
/// raw per-entry weight vector stage 4 below refines.
fn estimate_light_weights(scene: &Scene, sample: &SurfaceSample, rays_per_light: usize, rng_seed: u64) -> Vec<f32> {
    scene
        .lights()
        .iter()
        .enumerate()
        .map(|(light_idx, light)| {
            use rand::{Rng, SeedableRng};
            let mut rng = rand::rngs::StdRng::seed_from_u64(rng_seed ^ (light_idx as u64).wrapping_mul(0x9E37_79B9));
            let mut acc = 0.0f32;
            for _ in 0..rays_per_light.max(1) {
                let u = (rng.r#gen::<f32>(), rng.r#gen::<f32>());
                let Some(ls) = light.sample(sample.point, u) else { continue };
                if ls.pdf_w <= 0.0 || ls.radiance.is_black() {
                    continue;
                }
                let cos_theta = ls.wi.dot(sample.normal).max(0.0);
                if cos_theta <= 0.0 {
                    continue;
                }
                let shadow_maxt = if ls.distance.is_finite() { ls.distance - 1e-3 } else { f32::INFINITY };
                let mut shadow_ray = Ray::new(sample.point + sample.normal * 1e-4, ls.wi);
                shadow_ray.maxt = shadow_maxt.max(shadow_ray.mint);
                if scene.occluded(&shadow_ray) {
                    continue;
                }
                acc += ls.radiance.luminance() * cos_theta / ls.pdf_w;
            }
            acc / rays_per_light.max(1) as f32
        })
        .collect()
}

impl DirectLightSamplingCache {
    /// Stages 1-6: visibility-sample the candidates, estimate a clustering
    /// radius from the scene extent, greedily cluster candidates that are
    /// within that radius of an already-accepted entry, refine each
    /// surviving entry's light distribution with a deeper per-entry sampling
    /// pass, and index the result.
    pub fn build(scene: &Scene, candidates: &[SurfaceSample], params: DlscParams) -> Self {
        let global_weights: Vec<f32> = scene.lights().iter().map(|l| (1.0 + l.power().max(0.0)).ln()).collect();
        let global_distribution = Distribution1D::new(global_weights);

        if candidates.is_empty() || scene.lights().is_empty() {
            return DirectLightSamplingCache { entries: Vec::new(), bvh: IndexBvh::empty(), global_distribution, params };
        }

        // 1. Visibility sampling: a cheap one-ray-per-light pass over every
        // candidate, run in parallel since candidates don't interact.
        let quick_weights: Vec<Vec<f32>> =
            candidates.par_iter().enumerate().map(|(i, s)| estimate_light_weights(scene, s, 1, i as u64)).collect();

        // 2. Radius estimation: an explicit `look_up_radius`, or a radius
        // derived so `target_hit_rate` of the candidates have a neighbor
        // within it (see `derive_radius_from_hit_rate`).
        let diag = scene.bounds().diagonal().length().max(1e-3);
        let radius = if params.look_up_radius > 0.0 {
            params.look_up_radius
        } else {
            derive_radius_from_hit_rate(candidates, params.target_hit_rate, diag)
        };

        // 3. Clustering: greedily accept a candidate only if no previously
        // accepted entry already covers it within `radius`, so entry
        // density self-limits without a separate spatial index during build.
        let mut accepted: Vec<usize> = Vec::new();
        for (i, sample) in candidates.iter().enumerate() {
            let covered = accepted.iter().any(|&j| {
                let other = &candidates[j];
                other.is_volume == sample.is_volume
                    && (other.point - sample.point).length() <= radius
                    && other.normal.dot(sample.normal) > 0.0
            });
            if !covered && quick_weights[i].iter().any(|&w| w > 0.0) {
                accepted.push(i);
            }
        }

        // 4. Per-entry sampling: a deeper, independent refinement pass per
        // accepted entry, also parallel.
        let entries: Vec<DlscEntry> = accepted
            .par_iter()
            .map(|&i| {
                let sample = &candidates[i];
                let weights = estimate_light_weights(scene, sample, params.samples_per_entry, i as u64 ^ 0xD1B5_4A32);
                // 5. Build distribution: per-entry discrete distribution over
                // lights, falling back to uniform if every light came back
                // with zero weight (fully occluded candidate).
                let distribution = if weights.iter().any(|&w| w > 0.0) {
                    Distribution1D::new(weights.clone())
                } else {
                    Distribution1D::uniform(weights.len())
                };
                DlscEntry { point: sample.point, normal: sample.normal, is_volume: sample.is_volume, radius, distribution }
            })
            .collect();

        // 6. Index.
        let bvh = IndexBvh::build(&entries);
        DirectLightSamplingCache { entries, bvh, global_distribution, params }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `getLightDistribution(p, n, isVolume)`: the nearest entry's
    /// distribution, or the global log-power-style fallback if no entry is
    /// within the cache's normal-angle tolerance.
    fn distribution_at(&self, p: Vec3, n: Vec3, is_volume: bool) -> &Distribution1D {
        match self.bvh.nearest(&self.entries, p, n, is_volume, self.params.normal_angle_limit) {
            Some(idx) => &self.entries[idx as usize].distribution,
            None => &self.global_distribution,
        }
    }

    /// Sample a light index and its pdf under the cache's distribution at
    /// `(p, n, is_volume)`.
    pub fn sample_light(&self, p: Vec3, n: Vec3, is_volume: bool, u: f32) -> Option<(LightId, f32)> {
        let dist = self.distribution_at(p, n, is_volume);
        if dist.is_empty() {
            return None;
        }
        let (idx, pdf) = dist.sample(u);
        Some((idx as LightId, pdf))
    }

    pub fn light_pdf(&self, p: Vec3, n: Vec3, is_volume: bool, light: LightId) -> f32 {
        self.distribution_at(p, n, is_volume).pdf(light as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Spectrum;
    use crate::mesh::{MeshRef, TriangleMesh};
    use crate::scene::material::Material;
    use crate::texture::Texture;

    fn floor_scene_with_point_light() -> Scene {
        let mut scene = Scene::new();
        let vertices = vec![Vec3::new(-10.0, 0.0, -10.0), Vec3::new(10.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 10.0)];
        let mesh = TriangleMesh::build(vertices, vec![[0, 1, 2]], None, vec![], vec![], vec![], 0.0).unwrap();
        let mesh_id = scene.add_mesh("floor", mesh);
        let albedo = scene.textures.insert_named("albedo", Texture::Constant(Spectrum::splat(0.5)));
        let mat = scene.add_material("matte", Material::Matte { albedo });
        let mesh_arc = scene.mesh(mesh_id).clone();
        scene.begin_edit();
        scene.add_object("floor_obj", MeshRef::Base(mesh_arc), mat, None).unwrap();
        scene.add_light(crate::scene::light::LightSource::Point { position: Vec3::new(0.0, 5.0, 0.0), intensity: Spectrum::WHITE });
        scene.rebuild();
        scene
    }

    #[test]
    fn build_with_no_candidates_yields_empty_cache_that_still_answers_queries() {
        let scene = floor_scene_with_point_light();
        let cache = DirectLightSamplingCache::build(&scene, &[], DlscParams::default());
        assert!(cache.is_empty());
        let sampled = cache.sample_light(Vec3::ZERO, Vec3::Y, false, 0.3);
        assert!(sampled.is_some(), "empty cache still falls back to the global distribution");
    }

    #[test]
    fn clustering_reduces_dense_candidates_to_few_entries() {
        let scene = floor_scene_with_point_light();
        let mut candidates = Vec::new();
        for i in 0..50 {
            let x = (i as f32) * 0.01;
            candidates.push(SurfaceSample { point: Vec3::new(x, 0.0, 0.0), normal: Vec3::Y, is_volume: false });
        }
        let cache = DirectLightSamplingCache::build(&scene, &candidates, DlscParams { look_up_radius: 0.5, ..Default::default() });
        assert!(cache.len() < candidates.len());
    }

    #[test]
    fn auto_derived_radius_clusters_dense_candidates_without_an_explicit_look_up_radius() {
        let scene = floor_scene_with_point_light();
        let mut candidates = Vec::new();
        for i in 0..50 {
            let x = (i as f32) * 0.01;
            candidates.push(SurfaceSample { point: Vec3::new(x, 0.0, 0.0), normal: Vec3::Y, is_volume: false });
        }
        // `look_up_radius` stays at the default 0.0, so the radius must come
        // from the 99th-percentile nearest-neighbor distance (0.01 here,
        // since every candidate sits exactly 0.01 from its neighbor).
        let cache = DirectLightSamplingCache::build(&scene, &candidates, DlscParams::default());
        assert!(cache.len() < candidates.len());
    }

    #[test]
    fn derive_radius_from_hit_rate_matches_the_uniform_neighbor_spacing() {
        let candidates: Vec<SurfaceSample> =
            (0..10).map(|i| SurfaceSample { point: Vec3::new(i as f32 * 0.1, 0.0, 0.0), normal: Vec3::Y, is_volume: false }).collect();
        let radius = derive_radius_from_hit_rate(&candidates, 0.99, 100.0);
        assert!((radius - 0.1).abs() < 1e-5);
    }

    #[test]
    fn global_distribution_favors_the_brighter_light() {
        use crate::scene::light::LightSource;
        let mut scene = Scene::new();
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 1.0, 0.0), intensity: Spectrum::splat(1.0) });
        scene.add_light(LightSource::Point { position: Vec3::new(0.0, 1.0, 0.0), intensity: Spectrum::splat(1000.0) });
        scene.rebuild();
        let cache = DirectLightSamplingCache::build(&scene, &[], DlscParams::default());
        let (_, pdf_bright) = cache.sample_light(Vec3::ZERO, Vec3::Y, false, 0.999).unwrap();
        assert!(pdf_bright > 0.9, "global fallback should weight the brighter light heavily, got pdf {pdf_bright}");
    }

    #[test]
    fn query_near_a_built_entry_returns_a_valid_light_sample() {
        let scene = floor_scene_with_point_light();
        let candidates = vec![SurfaceSample { point: Vec3::new(0.0, 0.0, 0.0), normal: Vec3::Y, is_volume: false }];
        let cache = DirectLightSamplingCache::build(&scene, &candidates, DlscParams::default());
        assert_eq!(cache.len(), 1);
        let (light, pdf) = cache.sample_light(Vec3::new(0.0, 0.0, 0.0), Vec3::Y, false, 0.5).unwrap();
        assert_eq!(light, 0);
        assert!(pdf > 0.0);
    }
}
