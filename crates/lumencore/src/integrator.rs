//! # Path tracer
//!
//! A plain unidirectional path tracer: next-event estimation against a
//! [`crate::dlsc::DirectLightSamplingCache`] (or any other
//! [`VarianceReductionCache`]) plus BSDF sampling for the continuation ray,
//! combined by multiple importance sampling. Fixed knobs — per-lobe max
//! depth, Russian roulette, variance clamping — live on [`PathTracerParams`]
//! rather than scattered constants, mirroring how the scene's light/material
//! arenas centralize their own configuration.

use crate::color::Spectrum;
use crate::math::{Ray, Vec3};
use crate::scene::light::LightSource;
use crate::scene::{LightId, Scene};
use rand::Rng;

/// The query-only contract the DLSC and an optional photon-GI cache both
/// satisfy: "what light distribution should I sample from here". The
/// integrator depends on this trait, not on the DLSC concretely, so a
/// photon-GI cache can be dropped in without touching the sampling loop —
/// the symmetry the design calls for between the two variance-reduction
/// structures.
pub trait VarianceReductionCache: Send + Sync {
    fn sample_light(&self, p: Vec3, n: Vec3, is_volume: bool, u: f32) -> Option<(LightId, f32)>;
    fn light_pdf(&self, p: Vec3, n: Vec3, is_volume: bool, light: LightId) -> f32;
}

impl VarianceReductionCache for crate::dlsc::DirectLightSamplingCache {
    fn sample_light(&self, p: Vec3, n: Vec3, is_volume: bool, u: f32) -> Option<(LightId, f32)> {
        crate::dlsc::DirectLightSamplingCache::sample_light(self, p, n, is_volume, u)
    }
    fn light_pdf(&self, p: Vec3, n: Vec3, is_volume: bool, light: LightId) -> f32 {
        crate::dlsc::DirectLightSamplingCache::light_pdf(self, p, n, is_volume, light)
    }
}

#[derive(Debug, Clone)]
pub struct PathTracerParams {
    pub max_depth: u32,
    pub max_diffuse_depth: u32,
    pub max_glossy_depth: u32,
    pub max_specular_depth: u32,
    pub russian_roulette_depth: u32,
    pub russian_roulette_threshold: f32,
    /// `sqrtVarianceClampMaxValue`; a splatted sample's magnitude is clipped
    /// to this value squared.
    pub sqrt_variance_clamp_max_value: f32,
    /// Always evaluate direct lighting against the background/infinite
    /// lights even when a BSDF sample would also reach them, trading a
    /// small bias-free double-count risk (handled by MIS weights) for
    /// faster convergence on bright environment lighting.
    pub forced_background_direct_lighting: bool,
    /// Mix backward (camera-to-light) and forward (light-to-camera) path
    /// construction; unset means pure backward path tracing.
    pub hybrid_backward_forward: bool,
}

impl Default for PathTracerParams {
    fn default() -> Self {
        PathTracerParams {
            max_depth: 16,
            max_diffuse_depth: 8,
            max_glossy_depth: 8,
            max_specular_depth: 16,
            russian_roulette_depth: 4,
            russian_roulette_threshold: 0.05,
            sqrt_variance_clamp_max_value: 10.0,
            forced_background_direct_lighting: false,
            hybrid_backward_forward: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LobeKind {
    Diffuse,
    Glossy,
    Specular,
}

pub struct PathTracer {
    pub params: PathTracerParams,
}

impl PathTracer {
    pub fn new(params: PathTracerParams) -> Self {
        PathTracer { params }
    }

    /// Trace one camera path and return the estimated radiance along `ray`,
    /// already clamped per [`PathTracerParams::sqrt_variance_clamp_max_value`].
    pub fn trace(
        &self,
        scene: &Scene,
        cache: Option<&dyn VarianceReductionCache>,
        mut ray: Ray,
        rng: &mut impl Rng,
    ) -> Spectrum {
        let mut radiance = Spectrum::BLACK;
        let mut throughput = Spectrum::WHITE;
        let mut depth = 0u32;
        let mut diffuse_depth = 0u32;
        let mut glossy_depth = 0u32;
        let mut specular_depth = 0u32;
        let mut specular_bounce = true;

        loop {
            let Some(hit) = scene.intersect(&ray) else {
                if specular_bounce || self.params.forced_background_direct_lighting {
                    radiance += throughput * self.background_radiance(scene, ray.direction);
                }
                break;
            };

            let wo = -ray.direction;
            if specular_bounce {
                radiance += throughput * scene.emitted_radiance(&hit, wo);
            }

            let hit_point = scene.hit_point(&hit, wo);
            let material = scene.material(scene.object(hit.object).material);
            let Some(bsdf) = material.bsdf(&scene.textures, &hit_point, &scene.image_maps) else { break };

            if depth >= self.params.max_depth {
                break;
            }

            if !bsdf.is_specular() {
                radiance += throughput
                    * self.sample_direct_lighting(scene, cache, &bsdf, hit_point.p, wo, hit.ng, rng);
            }

            let Some(sample) = bsdf.sample(wo, rng) else { break };
            if sample.pdf <= 0.0 || sample.f_over_pdf.is_black() {
                break;
            }

            let lobe = if sample.specular { LobeKind::Specular } else if is_glossy(&bsdf) { LobeKind::Glossy } else { LobeKind::Diffuse };
            match lobe {
                LobeKind::Diffuse => diffuse_depth += 1,
                LobeKind::Glossy => glossy_depth += 1,
                LobeKind::Specular => specular_depth += 1,
            }
            if diffuse_depth > self.params.max_diffuse_depth
                || glossy_depth > self.params.max_glossy_depth
                || specular_depth > self.params.max_specular_depth
            {
                break;
            }

            throughput = throughput * sample.f_over_pdf;
            specular_bounce = sample.specular;
            depth += 1;

            if depth >= self.params.russian_roulette_depth {
                let continue_prob = throughput.max_component().clamp(self.params.russian_roulette_threshold, 1.0);
                if rng.r#gen::<f32>() > continue_prob {
                    break;
                }
                throughput *= 1.0 / continue_prob;
            }

            let offset = hit.ng * if sample.wi.dot(hit.ng) >= 0.0 { 1e-4 } else { -1e-4 };
            ray = Ray::new(hit_point.p + offset, sample.wi);
        }

        radiance.variance_clamped(self.params.sqrt_variance_clamp_max_value)
    }

    fn background_radiance(&self, scene: &Scene, direction: Vec3) -> Spectrum {
        scene.lights().iter().fold(Spectrum::BLACK, |acc, l| acc + l.eval_infinite(direction))
    }

    /// Next-event estimation: sample a light via the variance-reduction
    /// cache (falling back to the scene's own distribution), trace a shadow
    /// ray, and weight the BSDF/light pdfs with the power heuristic.
    fn sample_direct_lighting(
        &self,
        scene: &Scene,
        cache: Option<&dyn VarianceReductionCache>,
        bsdf: &crate::scene::bsdf::Bsdf,
        p: Vec3,
        wo: Vec3,
        n: Vec3,
        rng: &mut impl Rng,
    ) -> Spectrum {
        let is_volume = false;
        let picked = cache
            .and_then(|c| c.sample_light(p, n, is_volume, rng.r#gen()))
            .or_else(|| scene.sample_light(rng.r#gen()));
        let Some((light_id, light_pdf)) = picked else { return Spectrum::BLACK };
        if light_pdf <= 0.0 {
            return Spectrum::BLACK;
        }
        let light = scene.light(light_id);
        let Some(ls) = light.sample(p, (rng.r#gen(), rng.r#gen())) else { return Spectrum::BLACK };
        if ls.pdf_w <= 0.0 || ls.radiance.is_black() {
            return Spectrum::BLACK;
        }
        let f = bsdf.eval(wo, ls.wi);
        if f.is_black() {
            return Spectrum::BLACK;
        }
        let offset = n * if ls.wi.dot(n) >= 0.0 { 1e-4 } else { -1e-4 };
        let shadow_maxt = if ls.distance.is_finite() { ls.distance - 1e-3 } else { f32::INFINITY };
        let mut shadow_ray = Ray::new(p + offset, ls.wi);
        shadow_ray.maxt = shadow_maxt.max(shadow_ray.mint);
        if scene.occluded(&shadow_ray) {
            return Spectrum::BLACK;
        }
        let bsdf_pdf = bsdf.pdf(wo, ls.wi);
        let weight = if light.is_delta() { 1.0 } else { power_heuristic(ls.pdf_w, bsdf_pdf) };
        f * ls.radiance * (weight / (ls.pdf_w * light_pdf))
    }
}

fn is_glossy(bsdf: &crate::scene::bsdf::Bsdf) -> bool {
    matches!(bsdf, crate::scene::bsdf::Bsdf::Glossy { .. })
}

fn power_heuristic(pdf_a: f32, pdf_b: f32) -> f32 {
    let a2 = pdf_a * pdf_a;
    let b2 = pdf_b * pdf_b;
    if a2 + b2 <= 0.0 {
        0.0
    } else {
        a2 / (a2 + b2)
    }
}
