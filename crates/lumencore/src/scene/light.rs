//! Light sources. Every variant implements the same `sample`/`eval`/`pdf`
//! triad a direct-lighting estimator needs, grounded on how `PointLight`,
//! `MapPointLight`, `SpotLight`, `SunLight`, `TriangleLight` and
//! `InfiniteLight` each implement `Illuminate`/`Emit`/`Pdf` independently in
//! the original renderer rather than through a shared base-class default.

use crate::color::Spectrum;
use crate::image::MipImageMap;
use crate::math::{Transform, Vec2, Vec3};
use crate::mesh::TriangleMesh;
use std::sync::Arc;

/// A sampled connection from a shading point toward a light.
pub struct LightSample {
    pub wi: Vec3,
    pub distance: f32,
    pub radiance: Spectrum,
    pub pdf_w: f32,
}

pub enum LightSource {
    Point { position: Vec3, intensity: Spectrum },
    MapPoint { position: Vec3, intensity: Spectrum, map: Arc<MipImageMap>, to_world: Transform },
    Spot {
        position: Vec3,
        direction: Vec3,
        intensity: Spectrum,
        cos_total: f32,
        cos_falloff_start: f32,
    },
    Distant { direction: Vec3, radiance: Spectrum, angular_radius: f32 },
    Area { mesh: Arc<TriangleMesh>, triangle: u32, radiance: Spectrum, two_sided: bool },
    Environment { map: Option<Arc<MipImageMap>>, constant: Spectrum, to_world: Transform },
    Sky { turbidity: f32, sun_direction: Vec3, radiance_scale: f32 },
}

fn sample_triangle_uniform(u: (f32, f32)) -> (f32, f32) {
    let su0 = u.0.sqrt();
    (1.0 - su0, u.1 * su0)
}

impl LightSource {
    pub fn is_delta(&self) -> bool {
        matches!(self, LightSource::Point { .. } | LightSource::MapPoint { .. } | LightSource::Spot { .. } | LightSource::Distant { .. })
    }

    /// Sample an incident direction and distance from `from` toward this
    /// light, returning radiance already divided by nothing (callers divide
    /// by `pdf_w` themselves so delta lights can report `pdf_w = 1`).
    pub fn sample(&self, from: Vec3, u: (f32, f32)) -> Option<LightSample> {
        match self {
            LightSource::Point { position, intensity } => {
                let d = *position - from;
                let dist2 = d.length_squared();
                if dist2 <= 0.0 {
                    return None;
                }
                let distance = dist2.sqrt();
                Some(LightSample { wi: d / distance, distance, radiance: *intensity * (1.0 / dist2), pdf_w: 1.0 })
            }
            LightSource::MapPoint { position, intensity, map, to_world } => {
                let d = *position - from;
                let dist2 = d.length_squared();
                if dist2 <= 0.0 {
                    return None;
                }
                let distance = dist2.sqrt();
                let wi = d / distance;
                let local = to_world.inverse_transform_vector(-wi).normalize_or_zero();
                let uv = direction_to_equirect(local);
                let falloff = map.base().get_spectrum(uv);
                Some(LightSample { wi, distance, radiance: *intensity * falloff * (1.0 / dist2), pdf_w: 1.0 })
            }
            LightSource::Spot { position, direction, intensity, cos_total, cos_falloff_start } => {
                let d = *position - from;
                let dist2 = d.length_squared();
                if dist2 <= 0.0 {
                    return None;
                }
                let distance = dist2.sqrt();
                let wi = d / distance;
                let cos_theta = (-wi).dot(*direction);
                if cos_theta < *cos_total {
                    return None;
                }
                let falloff = if cos_theta > *cos_falloff_start {
                    1.0
                } else {
                    let delta = (cos_theta - cos_total) / (cos_falloff_start - cos_total).max(1e-6);
                    delta * delta * (3.0 - 2.0 * delta)
                };
                Some(LightSample { wi, distance, radiance: *intensity * (falloff / dist2), pdf_w: 1.0 })
            }
            LightSource::Distant { direction, radiance, .. } => {
                Some(LightSample { wi: -*direction, distance: f32::INFINITY, radiance: *radiance, pdf_w: 1.0 })
            }
            LightSource::Area { mesh, triangle, radiance, two_sided } => {
                let tri = mesh.triangles()[*triangle as usize];
                let (b1, b2) = sample_triangle_uniform(u);
                let b0 = 1.0 - b1 - b2;
                let p = mesh.vertex(tri[0]) * b0 + mesh.vertex(tri[1]) * b1 + mesh.vertex(tri[2]) * b2;
                let n = mesh.geometric_normal(*triangle);
                let d = p - from;
                let dist2 = d.length_squared();
                if dist2 <= 1e-12 {
                    return None;
                }
                let distance = dist2.sqrt();
                let wi = d / distance;
                let cos_light = (-wi).dot(n);
                if cos_light <= 0.0 && !*two_sided {
                    return None;
                }
                let area = mesh.triangle_area(*triangle);
                if area <= 0.0 {
                    return None;
                }
                let pdf_a = 1.0 / area;
                let pdf_w = pdf_a * dist2 / cos_light.abs().max(1e-6);
                Some(LightSample { wi, distance, radiance: *radiance, pdf_w })
            }
            LightSource::Environment { map, constant, to_world } => {
                let local = u_to_sphere_uniform(u);
                let wi = to_world.transform_vector(local).normalize_or_zero();
                let radiance = match map {
                    Some(m) => m.base().get_spectrum(direction_to_equirect(local)) * *constant,
                    None => *constant,
                };
                Some(LightSample { wi, distance: f32::INFINITY, radiance, pdf_w: std::f32::consts::FRAC_1_PI * 0.25 })
            }
            LightSource::Sky { sun_direction, radiance_scale, .. } => {
                let local = u_to_sphere_uniform(u);
                let wi = if local.y >= 0.0 { local } else { Vec3::new(local.x, -local.y, local.z) };
                let radiance = sky_radiance(wi, *sun_direction) * *radiance_scale;
                Some(LightSample { wi, distance: f32::INFINITY, radiance, pdf_w: std::f32::consts::FRAC_1_PI * 0.5 })
            }
        }
    }

    /// Radiance seen by a ray that escaped the scene along `direction`,
    /// used by the path tracer when no further intersection is found.
    pub fn eval_infinite(&self, direction: Vec3) -> Spectrum {
        match self {
            LightSource::Environment { map, constant, to_world } => {
                let local = to_world.inverse_transform_vector(direction).normalize_or_zero();
                match map {
                    Some(m) => m.base().get_spectrum(direction_to_equirect(local)) * *constant,
                    None => *constant,
                }
            }
            LightSource::Sky { sun_direction, radiance_scale, .. } => sky_radiance(direction, *sun_direction) * *radiance_scale,
            _ => Spectrum::BLACK,
        }
    }

    pub fn pdf_area_to_solid_angle(dist2: f32, cos_light: f32) -> f32 {
        dist2 / cos_light.abs().max(1e-6)
    }

    /// Total radiant power estimate used by the `POWER`/`LOG_POWER` global
    /// light-distribution strategies. Delta and infinite lights have no true
    /// finite power, so the isotropic/solid-angle/area integrals below are
    /// the same order-of-magnitude proxies the original's `Light::Power`
    /// overrides use per light type.
    pub fn power(&self) -> f32 {
        match self {
            LightSource::Point { intensity, .. } => std::f32::consts::TAU * 2.0 * intensity.luminance(),
            LightSource::MapPoint { intensity, .. } => std::f32::consts::TAU * 2.0 * intensity.luminance(),
            LightSource::Spot { intensity, cos_total, .. } => {
                std::f32::consts::TAU * (1.0 - cos_total) * intensity.luminance()
            }
            LightSource::Distant { radiance, .. } => radiance.luminance(),
            LightSource::Area { mesh, triangle, radiance, two_sided } => {
                let area = mesh.triangle_area(*triangle);
                let power = radiance.luminance() * area * std::f32::consts::PI;
                if *two_sided {
                    power * 2.0
                } else {
                    power
                }
            }
            LightSource::Environment { constant, .. } => std::f32::consts::TAU * 2.0 * constant.luminance(),
            LightSource::Sky { sun_direction, radiance_scale, .. } => {
                std::f32::consts::TAU * 2.0 * sky_radiance(Vec3::Y, *sun_direction).luminance() * radiance_scale
            }
        }
    }
}

fn u_to_sphere_uniform(u: (f32, f32)) -> Vec3 {
    let z = 1.0 - 2.0 * u.0;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = std::f32::consts::TAU * u.1;
    Vec3::new(r * phi.cos(), z, r * phi.sin())
}

fn direction_to_equirect(d: Vec3) -> Vec2 {
    let phi = d.z.atan2(d.x);
    let theta = d.y.clamp(-1.0, 1.0).acos();
    Vec2::new(phi / std::f32::consts::TAU + 0.5, theta / std::f32::consts::PI)
}

/// A simplified Preetham-style sky: a clear-sky gradient plus a Henyey-
/// Greenstein-shaped sun disc, not the original's full analytic fit — see
/// the grounding ledger for why the coefficient table was dropped.
fn sky_radiance(direction: Vec3, sun_direction: Vec3) -> Spectrum {
    let up = direction.y.max(0.0);
    let horizon = Spectrum::new(0.9, 0.95, 1.0);
    let zenith = Spectrum::new(0.25, 0.45, 0.85);
    let sky = Spectrum::lerp(horizon, zenith, up.powf(0.5));
    let cos_sun = direction.dot(sun_direction).clamp(-1.0, 1.0);
    let sun_glow = (cos_sun.max(0.0)).powf(256.0) * 50.0 + (cos_sun.max(0.0)).powf(8.0) * 0.5;
    sky + Spectrum::new(1.0, 0.9, 0.7) * sun_glow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_light_falls_off_with_inverse_square() {
        let light = LightSource::Point { position: Vec3::new(0.0, 2.0, 0.0), intensity: Spectrum::WHITE };
        let s = light.sample(Vec3::ZERO, (0.0, 0.0)).unwrap();
        assert!((s.radiance.r - 0.25).abs() < 1e-5);
    }

    #[test]
    fn spot_light_outside_cone_is_dark() {
        let light = LightSource::Spot {
            position: Vec3::new(0.0, 1.0, 0.0),
            direction: Vec3::new(1.0, 0.0, 0.0),
            intensity: Spectrum::WHITE,
            cos_total: 0.9,
            cos_falloff_start: 0.95,
        };
        let s = light.sample(Vec3::ZERO, (0.0, 0.0));
        assert!(s.is_none());
    }

    #[test]
    fn distant_light_direction_is_constant() {
        let light = LightSource::Distant { direction: Vec3::new(0.0, -1.0, 0.0), radiance: Spectrum::WHITE, angular_radius: 0.01 };
        let s1 = light.sample(Vec3::ZERO, (0.1, 0.2)).unwrap();
        let s2 = light.sample(Vec3::new(5.0, 5.0, 5.0), (0.9, 0.3)).unwrap();
        assert_eq!(s1.wi, s2.wi);
    }

    #[test]
    fn brighter_point_light_has_proportionally_more_power() {
        let dim = LightSource::Point { position: Vec3::ZERO, intensity: Spectrum::splat(1.0) };
        let bright = LightSource::Point { position: Vec3::ZERO, intensity: Spectrum::splat(10.0) };
        assert!((bright.power() / dim.power() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn narrower_spot_cone_has_less_power_than_a_wide_one_of_equal_intensity() {
        let narrow = LightSource::Spot {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            intensity: Spectrum::WHITE,
            cos_total: 0.99,
            cos_falloff_start: 0.995,
        };
        let wide = LightSource::Spot {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            intensity: Spectrum::WHITE,
            cos_total: 0.5,
            cos_falloff_start: 0.6,
        };
        assert!(narrow.power() < wide.power());
    }
}
