//! The imaging pipeline: a linear chain of stages applied to a materialized
//! `*_IMAGEPIPELINE` output buffer. `film.imagepipelines.<i>.<j>.type`
//! configuration becomes `Vec<Stage>`; replacing a pipeline's stage list
//! replaces it atomically (the caller swaps the whole `Pipeline`, never
//! mutates stages in place).

use crate::color::Spectrum;

/// One imaging-pipeline stage. Each operates on a flat `components`-wide
/// float raster in place.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    AutoLinearToneMap,
    LinearToneMap { scale: f32 },
    GammaCorrection { gamma: f32 },
    ContourLines { scale: f32, range: f32, steps: u32 },
    Bloom { radius: f32, weight: f32 },
    /// Separable box/gaussian convolution; `radius` in pixels.
    Convolution { radius: u32 },
    /// Adapter for an external OIDN-style denoiser. The core never links a
    /// denoiser directly (out of scope); this stage is a pass-through hook
    /// a caller can intercept via [`Pipeline::denoiser`].
    Denoise,
}

/// Hook an embedding application can set to intercept [`Stage::Denoise`]. The
/// core has no denoiser dependency of its own — this is the seam a future
/// OIDN/Optix binding would plug into.
pub trait Denoiser: Send + Sync {
    fn denoise(&self, pixels: &mut [f32], width: u32, height: u32, components: usize);
}

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    denoiser: Option<std::sync::Arc<dyn Denoiser>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline { stages, denoiser: None }
    }

    /// Auto-linear-tone-map → gamma-correction, matching §4.5's stated
    /// default chain.
    pub fn default_chain() -> Self {
        Pipeline::new(vec![Stage::AutoLinearToneMap, Stage::GammaCorrection { gamma: 2.2 }])
    }

    pub fn with_denoiser(mut self, denoiser: std::sync::Arc<dyn Denoiser>) -> Self {
        self.denoiser = Some(denoiser);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn apply(&self, pixels: &mut [f32], width: u32, height: u32, components: usize) {
        for stage in &self.stages {
            apply_stage(stage, pixels, width, height, components, self.denoiser.as_deref());
        }
    }
}

fn average_luminance(pixels: &[f32], components: usize) -> f32 {
    if components < 3 || pixels.is_empty() {
        return pixels.iter().copied().sum::<f32>() / pixels.len().max(1) as f32;
    }
    let n = pixels.len() / components;
    let sum: f32 = pixels
        .chunks(components)
        .map(|px| Spectrum::new(px[0], px[1], px[2]).luminance())
        .sum();
    sum / n.max(1) as f32
}

fn apply_stage(stage: &Stage, pixels: &mut [f32], width: u32, height: u32, components: usize, denoiser: Option<&dyn Denoiser>) {
    match stage {
        Stage::AutoLinearToneMap => {
            let avg = average_luminance(pixels, components).max(1e-6);
            let scale = 0.18 / avg;
            pixels.iter_mut().for_each(|v| *v *= scale);
        }
        Stage::LinearToneMap { scale } => {
            pixels.iter_mut().for_each(|v| *v *= scale);
        }
        Stage::GammaCorrection { gamma } => {
            let inv = 1.0 / gamma;
            pixels.iter_mut().for_each(|v| *v = v.max(0.0).powf(inv));
        }
        Stage::ContourLines { scale, range, steps } => {
            if components < 1 || *steps == 0 {
                return;
            }
            for px in pixels.chunks_mut(components) {
                let band = (px[0] * scale / range * *steps as f32).floor() / *steps as f32 * range;
                for c in px.iter_mut().take(components.min(3)) {
                    *c = band;
                }
            }
        }
        Stage::Bloom { radius, weight } => apply_bloom(pixels, width, height, components, *radius, *weight),
        Stage::Convolution { radius } => apply_box_blur(pixels, width, height, components, *radius),
        Stage::Denoise => {
            if let Some(d) = denoiser {
                d.denoise(pixels, width, height, components);
            }
        }
    }
}

fn apply_box_blur(pixels: &mut [f32], width: u32, height: u32, components: usize, radius: u32) {
    if radius == 0 {
        return;
    }
    let (w, h) = (width as i64, height as i64);
    let r = radius as i64;
    let src = pixels.to_vec();
    for y in 0..h {
        for x in 0..w {
            let mut acc = vec![0.0f32; components];
            let mut count = 0.0f32;
            for dy in -r..=r {
                for dx in -r..=r {
                    let (sx, sy) = (x + dx, y + dy);
                    if sx < 0 || sy < 0 || sx >= w || sy >= h {
                        continue;
                    }
                    let base = ((sy * w + sx) as usize) * components;
                    for c in 0..components {
                        acc[c] += src[base + c];
                    }
                    count += 1.0;
                }
            }
            let base = ((y * w + x) as usize) * components;
            for c in 0..components {
                pixels[base + c] = acc[c] / count;
            }
        }
    }
}

fn apply_bloom(pixels: &mut [f32], width: u32, height: u32, components: usize, radius: f32, weight: f32) {
    let mut blurred = pixels.to_vec();
    apply_box_blur(&mut blurred, width, height, components, radius.max(1.0) as u32);
    for (p, b) in pixels.iter_mut().zip(blurred.iter()) {
        *p += b * weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_correction_brightens_midtones() {
        let mut pixels = vec![0.5f32, 0.5, 0.5];
        apply_stage(&Stage::GammaCorrection { gamma: 2.2 }, &mut pixels, 1, 1, 3, None);
        assert!(pixels[0] > 0.5);
    }

    #[test]
    fn default_chain_is_tonemap_then_gamma() {
        let pipe = Pipeline::default_chain();
        assert_eq!(pipe.stages().len(), 2);
        assert!(matches!(pipe.stages()[0], Stage::AutoLinearToneMap));
    }

    #[test]
    fn box_blur_preserves_uniform_field() {
        let mut pixels = vec![1.0f32; 9];
        apply_box_blur(&mut pixels, 3, 3, 1, 1);
        for p in pixels {
            assert!((p - 1.0).abs() < 1e-5);
        }
    }
}
