//! Materials. A [`Material`] is a tagged variant that reads the texture
//! graph's outputs at a [`HitPoint`] and produces a [`Bsdf`] — the crate's
//! analogue of the original's per-material `GetBSDF` virtual call, without
//! the virtual dispatch.

use crate::color::Spectrum;
use crate::image::MipImageMap;
use crate::scene::bsdf::Bsdf;
use crate::texture::{HitPoint, TextureGraph, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmissionSpec {
    pub texture: TextureId,
    pub gain: f32,
    pub power: f32,
    pub efficacy: f32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Material {
    Matte { albedo: TextureId },
    Mirror { reflectance: TextureId },
    Glass { reflectance: TextureId, transmittance: TextureId, ior: f32 },
    Glossy { albedo: TextureId, exponent: TextureId },
    Mix { a: TextureId, b: Box<Material>, c: Box<Material> },
    Null,
}

impl Material {
    /// Build the BSDF this material presents at `hit`, by reading the
    /// relevant texture outputs through `graph`.
    pub fn bsdf(&self, graph: &TextureGraph, hit: &HitPoint, images: &[MipImageMap]) -> Option<Bsdf> {
        match self {
            Material::Matte { albedo } => {
                Some(Bsdf::Diffuse { albedo: graph.get_spectrum(*albedo, hit, images), n: hit.ns })
            }
            Material::Mirror { reflectance } => {
                Some(Bsdf::Mirror { reflectance: graph.get_spectrum(*reflectance, hit, images), n: hit.ns })
            }
            Material::Glass { reflectance, transmittance, ior } => Some(Bsdf::Glass {
                reflectance: graph.get_spectrum(*reflectance, hit, images),
                transmittance: graph.get_spectrum(*transmittance, hit, images),
                ior: *ior,
                n: hit.ns,
            }),
            Material::Glossy { albedo, exponent } => Some(Bsdf::Glossy {
                albedo: graph.get_spectrum(*albedo, hit, images),
                n: hit.ns,
                exponent: graph.get_float(*exponent, hit, images).max(1.0),
            }),
            Material::Mix { a, b, c } => {
                let weight = graph.get_float(*a, hit, images);
                if weight <= 0.0 {
                    b.bsdf(graph, hit, images)
                } else if weight >= 1.0 {
                    c.bsdf(graph, hit, images)
                } else {
                    // A mixed lobe would need a combined-pdf BSDF; stochastic
                    // lobe selection keeps the estimator unbiased without one.
                    let pick = (hit.p.x.to_bits() ^ hit.p.y.to_bits() ^ hit.p.z.to_bits()) as f32 / u32::MAX as f32;
                    if pick < weight { c.bsdf(graph, hit, images) } else { b.bsdf(graph, hit, images) }
                }
            }
            Material::Null => None,
        }
    }

    pub fn children(&self) -> Vec<&Material> {
        match self {
            Material::Mix { b, c, .. } => vec![b.as_ref(), c.as_ref()],
            _ => Vec::new(),
        }
    }
}

/// Material-level emission: independent of the BSDF lobe, added whenever a
/// path directly hits an emissive surface.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Emitter {
    pub spec: EmissionSpec,
}

impl Emitter {
    pub fn radiance(&self, graph: &TextureGraph, hit: &HitPoint, images: &[MipImageMap]) -> Spectrum {
        graph.get_spectrum(self.spec.texture, hit, images) * self.spec.gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Vec2, Vec3};
    use crate::texture::Texture;

    fn flat_hit() -> HitPoint {
        HitPoint {
            p: Vec3::ZERO,
            n: Vec3::Y,
            ns: Vec3::Y,
            uv: [Vec2::ZERO; 8],
            color: [Spectrum::WHITE; 8],
            alpha: [1.0; 8],
            dpdu: Vec3::X,
            dpdv: Vec3::Z,
            wo: Vec3::Y,
            object_id: 0,
            material_id: 0,
        }
    }

    #[test]
    fn matte_material_produces_diffuse_bsdf() {
        let mut graph = TextureGraph::new();
        let albedo = graph.insert_named("albedo", Texture::Constant(Spectrum::splat(0.8)));
        let mat = Material::Matte { albedo };
        let bsdf = mat.bsdf(&graph, &flat_hit(), &[]).unwrap();
        assert!(matches!(bsdf, Bsdf::Diffuse { .. }));
    }

    #[test]
    fn null_material_has_no_bsdf() {
        let graph = TextureGraph::new();
        assert!(Material::Null.bsdf(&graph, &flat_hit(), &[]).is_none());
    }
}
