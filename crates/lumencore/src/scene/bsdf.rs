//! BSDF lobes evaluated at a shading point. A [`Bsdf`] is produced from a
//! [`super::material::Material`] plus the texture graph's output at that hit
//! point; it never outlives the call that built it.

use crate::color::Spectrum;
use crate::math::Vec3;
use rand::Rng;

fn local_frame(n: Vec3) -> (Vec3, Vec3) {
    let sign = if n.z >= 0.0 { 1.0 } else { -1.0 };
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    (Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x), Vec3::new(b, sign + n.y * n.y * a, -n.y))
}

fn to_world(n: Vec3, w: Vec3) -> Vec3 {
    let (t, b) = local_frame(n);
    t * w.x + b * w.y + n * w.z
}

fn cosine_sample_hemisphere(u: (f32, f32)) -> Vec3 {
    let r = u.0.sqrt();
    let phi = std::f32::consts::TAU * u.1;
    Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - u.0).max(0.0).sqrt())
}

/// Result of a BSDF sample: outgoing direction, throughput weight already
/// divided by the sampling pdf, and whether the lobe is a delta (specular)
/// distribution that a direct-lighting strategy must skip.
pub struct BsdfSample {
    pub wi: Vec3,
    pub f_over_pdf: Spectrum,
    pub pdf: f32,
    pub specular: bool,
}

pub enum Bsdf {
    Diffuse { albedo: Spectrum, n: Vec3 },
    Mirror { reflectance: Spectrum, n: Vec3 },
    Glass { reflectance: Spectrum, transmittance: Spectrum, ior: f32, n: Vec3 },
    Glossy { albedo: Spectrum, n: Vec3, exponent: f32 },
}

impl Bsdf {
    pub fn normal(&self) -> Vec3 {
        match self {
            Bsdf::Diffuse { n, .. } | Bsdf::Mirror { n, .. } | Bsdf::Glass { n, .. } | Bsdf::Glossy { n, .. } => *n,
        }
    }

    pub fn is_specular(&self) -> bool {
        matches!(self, Bsdf::Mirror { .. } | Bsdf::Glass { .. })
    }

    /// `f(wo, wi) * |cos theta_i|`, used by the direct-lighting estimator.
    /// Delta lobes never contribute (probability zero of matching a sampled
    /// light direction) and return black.
    pub fn eval(&self, wo: Vec3, wi: Vec3) -> Spectrum {
        match self {
            Bsdf::Diffuse { albedo, n } => {
                let cos_i = n.dot(wi);
                if cos_i <= 0.0 || n.dot(wo) <= 0.0 {
                    Spectrum::BLACK
                } else {
                    *albedo * (std::f32::consts::FRAC_1_PI * cos_i)
                }
            }
            Bsdf::Glossy { albedo, n, exponent } => {
                let cos_i = n.dot(wi);
                let cos_o = n.dot(wo);
                if cos_i <= 0.0 || cos_o <= 0.0 {
                    return Spectrum::BLACK;
                }
                let reflect = (-wo + *n * (2.0 * n.dot(wo))).normalize_or_zero();
                let cos_alpha = reflect.dot(wi).max(0.0);
                let norm = (*exponent + 2.0) / std::f32::consts::TAU;
                *albedo * (norm * cos_alpha.powf(*exponent) * cos_i)
            }
            Bsdf::Mirror { .. } | Bsdf::Glass { .. } => Spectrum::BLACK,
        }
    }

    pub fn pdf(&self, wo: Vec3, wi: Vec3) -> f32 {
        match self {
            Bsdf::Diffuse { n, .. } => {
                let cos_i = n.dot(wi);
                if cos_i <= 0.0 || n.dot(wo) <= 0.0 {
                    0.0
                } else {
                    cos_i * std::f32::consts::FRAC_1_PI
                }
            }
            Bsdf::Glossy { n, exponent, .. } => {
                let reflect = (-wo + *n * (2.0 * n.dot(wo))).normalize_or_zero();
                let cos_alpha = reflect.dot(wi).max(0.0);
                (*exponent + 1.0) / std::f32::consts::TAU * cos_alpha.powf(*exponent)
            }
            Bsdf::Mirror { .. } | Bsdf::Glass { .. } => 0.0,
        }
    }

    pub fn sample(&self, wo: Vec3, rng: &mut impl Rng) -> Option<BsdfSample> {
        match self {
            Bsdf::Diffuse { albedo, n } => {
                if n.dot(wo) <= 0.0 {
                    return None;
                }
                let local = cosine_sample_hemisphere((rng.r#gen(), rng.r#gen()));
                let wi = to_world(*n, local);
                let pdf = self.pdf(wo, wi);
                if pdf <= 0.0 {
                    return None;
                }
                Some(BsdfSample { wi, f_over_pdf: *albedo, pdf, specular: false })
            }
            Bsdf::Mirror { reflectance, n } => {
                let wi = (-wo + *n * (2.0 * n.dot(wo))).normalize_or_zero();
                Some(BsdfSample { wi, f_over_pdf: *reflectance, pdf: 1.0, specular: true })
            }
            Bsdf::Glass { reflectance, transmittance, ior, n } => {
                let cos_o = n.dot(wo);
                let entering = cos_o > 0.0;
                let (nn, eta) = if entering { (*n, 1.0 / *ior) } else { (-*n, *ior) };
                let cos_o = cos_o.abs();
                let sin2_t = eta * eta * (1.0 - cos_o * cos_o).max(0.0);
                if sin2_t >= 1.0 {
                    let wi = (-wo + nn * (2.0 * nn.dot(wo))).normalize_or_zero();
                    return Some(BsdfSample { wi, f_over_pdf: *reflectance, pdf: 1.0, specular: true });
                }
                let cos_t = (1.0 - sin2_t).sqrt();
                let fresnel = schlick_fresnel(cos_o, *ior);
                if rng.r#gen::<f32>() < fresnel {
                    let wi = (-wo + nn * (2.0 * nn.dot(wo))).normalize_or_zero();
                    Some(BsdfSample { wi, f_over_pdf: *reflectance, pdf: fresnel, specular: true })
                } else {
                    let wi = (-wo * eta + nn * (eta * cos_o - cos_t)).normalize_or_zero();
                    Some(BsdfSample { wi, f_over_pdf: *transmittance, pdf: 1.0 - fresnel, specular: true })
                }
            }
            Bsdf::Glossy { n, exponent, .. } => {
                if n.dot(wo) <= 0.0 {
                    return None;
                }
                let reflect = (-wo + *n * (2.0 * n.dot(wo))).normalize_or_zero();
                let u: (f32, f32) = (rng.r#gen(), rng.r#gen());
                let cos_a = u.0.powf(1.0 / (*exponent + 1.0));
                let sin_a = (1.0 - cos_a * cos_a).max(0.0).sqrt();
                let phi = std::f32::consts::TAU * u.1;
                let local = Vec3::new(sin_a * phi.cos(), sin_a * phi.sin(), cos_a);
                let wi = to_world(reflect, local);
                if n.dot(wi) <= 0.0 {
                    return None;
                }
                let pdf = self.pdf(wo, wi);
                if pdf <= 0.0 {
                    return None;
                }
                let f = self.eval(wo, wi);
                Some(BsdfSample { wi, f_over_pdf: f * (1.0 / pdf), pdf, specular: false })
            }
        }
    }

}

fn schlick_fresnel(cos_theta: f32, ior: f32) -> f32 {
    let r0 = ((1.0 - ior) / (1.0 + ior)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cos_theta).powi(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn diffuse_sample_stays_in_upper_hemisphere() {
        let bsdf = Bsdf::Diffuse { albedo: Spectrum::WHITE, n: Vec3::Y };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let s = bsdf.sample(Vec3::Y, &mut rng).unwrap();
            assert!(s.wi.dot(Vec3::Y) >= -1e-4);
            assert!(!s.specular);
        }
    }

    #[test]
    fn mirror_reflects_about_normal() {
        let bsdf = Bsdf::Mirror { reflectance: Spectrum::WHITE, n: Vec3::Y };
        let mut rng = StdRng::seed_from_u64(1);
        let s = bsdf.sample(Vec3::new(1.0, 1.0, 0.0).normalize(), &mut rng).unwrap();
        assert!(s.specular);
        assert!(s.wi.y > 0.0);
    }

    #[test]
    fn diffuse_eval_matches_lambert_cosine_law() {
        let bsdf = Bsdf::Diffuse { albedo: Spectrum::splat(0.5), n: Vec3::Y };
        let wi = Vec3::new(0.0, 1.0, 0.0);
        let f = bsdf.eval(Vec3::Y, wi);
        assert!((f.r - 0.5 * std::f32::consts::FRAC_1_PI).abs() < 1e-5);
    }
}
