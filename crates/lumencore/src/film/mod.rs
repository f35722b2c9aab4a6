//! # Film
//!
//! The accumulation buffer the tile workers splat into and the imaging
//! pipeline reads from. Every channel in [`OutputType`] is a per-pixel
//! `{sum, weight}` pair (or `sum`-only for the weightless channels, see
//! [`OutputType::is_weighted`]) rather than a bespoke struct per channel —
//! one [`ChannelBuffer`] shape serves all of them, the same flattening the
//! crate's BVH applies to its node payloads.

pub mod pipeline;

use crate::color::Spectrum;
use crate::error::{RenderError, Result};
use std::collections::HashMap;

/// The fixed output-channel enum (§6's "Film output types"); persisted ids
/// must not be renumbered, since `.bcf`/`.rsm` film blocks key channels by
/// this enum's discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum OutputType {
    Rgb = 0,
    Rgba,
    RgbImagepipeline,
    RgbaImagepipeline,
    Alpha,
    Depth,
    Position,
    GeometryNormal,
    ShadingNormal,
    MaterialId,
    DirectDiffuse,
    DirectDiffuseReflect,
    DirectDiffuseTransmit,
    DirectGlossy,
    DirectGlossyReflect,
    DirectGlossyTransmit,
    Emission,
    IndirectDiffuse,
    IndirectDiffuseReflect,
    IndirectDiffuseTransmit,
    IndirectGlossy,
    IndirectGlossyReflect,
    IndirectGlossyTransmit,
    IndirectSpecular,
    IndirectSpecularReflect,
    IndirectSpecularTransmit,
    MaterialIdMask,
    DirectShadowMask,
    IndirectShadowMask,
    RadianceGroup,
    Uv,
    Raycount,
    ByMaterialId,
    Irradiance,
    ObjectId,
    ObjectIdMask,
    ByObjectId,
    Samplecount,
    Convergence,
    SerializedFilm,
    MaterialIdColor,
    Albedo,
    AvgShadingNormal,
    Noise,
    UserImportance,
    Caustic,
}

impl OutputType {
    /// Channel width in floats (RGB-like channels carry 3, scalar channels
    /// carry 1, `Uv` carries 2). `SerializedFilm` has no raster and is
    /// handled entirely in `save_output`.
    pub fn components(self) -> usize {
        use OutputType::*;
        match self {
            Rgb | RgbImagepipeline | Position | GeometryNormal | ShadingNormal | Emission | DirectDiffuse
            | DirectDiffuseReflect | DirectDiffuseTransmit | DirectGlossy | DirectGlossyReflect | DirectGlossyTransmit
            | IndirectDiffuse | IndirectDiffuseReflect | IndirectDiffuseTransmit | IndirectGlossy
            | IndirectGlossyReflect | IndirectGlossyTransmit | IndirectSpecular | IndirectSpecularReflect
            | IndirectSpecularTransmit | RadianceGroup | Irradiance | MaterialIdColor | Albedo | AvgShadingNormal
            | Caustic => 3,
            Rgba | RgbaImagepipeline => 4,
            Uv => 2,
            SerializedFilm => 0,
            _ => 1,
        }
    }

    /// Whether this channel accumulates a weighted running average
    /// (radiance-like channels) or a plain running sum/last-value
    /// (ids, masks, counts).
    pub fn is_weighted(self) -> bool {
        self.components() == 3 || self.components() == 4
    }
}

/// A flat per-pixel buffer: `components` floats of `sum` plus (if weighted)
/// one float of accumulated `weight`, per pixel.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    pub width: u32,
    pub height: u32,
    pub components: usize,
    pub weighted: bool,
    sum: Vec<f32>,
    weight: Vec<f32>,
}

impl ChannelBuffer {
    fn new(width: u32, height: u32, components: usize, weighted: bool) -> Self {
        let n = (width as usize) * (height as usize);
        ChannelBuffer {
            width,
            height,
            components,
            weighted,
            sum: vec![0.0; n * components.max(1)],
            weight: if weighted { vec![0.0; n] } else { Vec::new() },
        }
    }

    fn clear(&mut self) {
        self.sum.iter_mut().for_each(|v| *v = 0.0);
        self.weight.iter_mut().for_each(|v| *v = 0.0);
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    pub fn splat(&mut self, x: u32, y: u32, values: &[f32], weight: f32) {
        let pixel = self.index(x, y);
        let base = pixel * self.components;
        for (c, v) in values.iter().enumerate().take(self.components) {
            self.sum[base + c] += v * if self.weighted { weight } else { 1.0 };
        }
        if self.weighted {
            self.weight[pixel] += weight;
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Vec<f32> {
        let pixel = self.index(x, y);
        let base = pixel * self.components;
        let w = if self.weighted { self.weight[pixel] } else { 1.0 };
        if w <= 0.0 {
            return vec![0.0; self.components];
        }
        self.sum[base..base + self.components].iter().map(|v| v / w).collect()
    }

    fn add_from(&mut self, other: &ChannelBuffer) {
        for (a, b) in self.sum.iter_mut().zip(other.sum.iter()) {
            *a += b;
        }
        for (a, b) in self.weight.iter_mut().zip(other.weight.iter()) {
            *a += b;
        }
    }

    /// Raw accumulated sums, for the resume-file writer in [`crate::persist`]
    /// users — not divided by weight, unlike [`ChannelBuffer::get`].
    pub fn raw_sum(&self) -> &[f32] {
        &self.sum
    }

    pub fn raw_weight(&self) -> &[f32] {
        &self.weight
    }

    /// Rebuild a buffer from raw sum/weight arrays read back from a resume
    /// file. `sum.len()` and `weight.len()` must match what `new` would have
    /// allocated for the same dimensions.
    pub fn from_raw(width: u32, height: u32, components: usize, weighted: bool, sum: Vec<f32>, weight: Vec<f32>) -> Self {
        ChannelBuffer { width, height, components, weighted, sum, weight }
    }

    /// Overwrite a single-component pixel outright, used to publish a
    /// derived per-pixel metric (noise, convergence) rather than splat an
    /// incremental sample.
    pub fn set_scalar(&mut self, x: u32, y: u32, value: f32) {
        let pixel = self.index(x, y);
        self.sum[pixel] = value;
    }
}

pub struct Film {
    pub width: u32,
    pub height: u32,
    channels: HashMap<OutputType, ChannelBuffer>,
    /// Raw running sum of per-pixel squared luminance, tracked independently
    /// of the requested output set so `mean_relative_noise` always has data
    /// to estimate from even when nobody asked for a `NOISE`/`CONVERGENCE`
    /// output explicitly.
    variance: ChannelBuffer,
}

impl Film {
    /// Create a film with exactly the requested channel set (mirrors
    /// `film.outputs.<i>.type` configuration — a film never allocates
    /// channels nobody asked for).
    pub fn new(width: u32, height: u32, outputs: &[OutputType]) -> Self {
        let mut channels = HashMap::new();
        for &ty in outputs {
            if ty == OutputType::SerializedFilm {
                continue;
            }
            channels.insert(ty, ChannelBuffer::new(width, height, ty.components(), ty.is_weighted()));
        }
        let variance = ChannelBuffer::new(width, height, 1, false);
        Film { width, height, channels, variance }
    }

    pub fn clear(&mut self) {
        for buffer in self.channels.values_mut() {
            buffer.clear();
        }
        self.variance.clear();
    }

    pub fn has_channel(&self, ty: OutputType) -> bool {
        self.channels.contains_key(&ty)
    }

    /// The sole write path from the sampler: splat one sample's
    /// contribution to `channel` at `(x, y)`.
    pub fn splat(&mut self, x: u32, y: u32, channel: OutputType, values: &[f32], weight: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        if let Some(buf) = self.channels.get_mut(&channel) {
            buf.splat(x, y, values, weight);
        }
    }

    pub fn splat_radiance(&mut self, x: u32, y: u32, radiance: Spectrum, weight: f32) {
        self.splat(x, y, OutputType::Rgb, &[radiance.r, radiance.g, radiance.b], weight);
        if x < self.width && y < self.height {
            let lum = radiance.luminance();
            self.variance.splat(x, y, &[lum * lum], weight);
        }
    }

    /// Merge another film's contributions into this one additively
    /// (per-thread film -> shared film merge at tile completion).
    pub fn add_film(&mut self, src: &Film) {
        for (ty, buf) in &src.channels {
            if let Some(dst) = self.channels.get_mut(ty) {
                dst.add_from(buf);
            }
        }
        self.variance.add_from(&src.variance);
    }

    /// Average per-pixel relative noise (coefficient of variation of the
    /// accumulated luminance) across every pixel that has received at least
    /// one sample; `0.0` once a film is perfectly converged or has no
    /// samples at all. The estimator `halt.noisethreshold` is checked
    /// against.
    pub fn mean_relative_noise(&self) -> f32 {
        let Some(rgb) = self.channels.get(&OutputType::Rgb) else { return 0.0 };
        let weight = rgb.raw_weight();
        let sum = rgb.raw_sum();
        let variance_sum = self.variance.raw_sum();
        let mut total = 0.0f32;
        let mut counted = 0usize;
        for pixel in 0..weight.len() {
            let w = weight[pixel];
            if w <= 0.0 {
                continue;
            }
            let base = pixel * rgb.components;
            let mean = 0.2126 * sum[base] / w + 0.7152 * sum[base + 1] / w + 0.0722 * sum[base + 2] / w;
            let mean_sq = variance_sum[pixel] / w;
            let var = (mean_sq - mean * mean).max(0.0);
            total += var.sqrt() / mean.max(1e-6);
            counted += 1;
        }
        if counted == 0 {
            0.0
        } else {
            total / counted as f32
        }
    }

    /// Publish the per-pixel noise estimate into the `NOISE` output and a
    /// 0/1 converged flag into the `CONVERGENCE` output, for whichever of
    /// the two the session was configured to produce. `threshold` is
    /// `halt.noisethreshold`; a pixel with relative noise under it counts as
    /// converged.
    pub fn refresh_noise_channels(&mut self, threshold: f32) {
        let has_noise = self.channels.contains_key(&OutputType::Noise);
        let has_convergence = self.channels.contains_key(&OutputType::Convergence);
        if !has_noise && !has_convergence {
            return;
        }
        let Some(rgb) = self.channels.get(&OutputType::Rgb) else { return };
        let weight = rgb.raw_weight().to_vec();
        let sum = rgb.raw_sum().to_vec();
        let components = rgb.components;
        let variance_sum = self.variance.raw_sum().to_vec();

        for y in 0..self.height {
            for x in 0..self.width {
                let pixel = (y as usize) * (self.width as usize) + (x as usize);
                let w = weight[pixel];
                let noise = if w > 0.0 {
                    let base = pixel * components;
                    let mean = 0.2126 * sum[base] / w + 0.7152 * sum[base + 1] / w + 0.0722 * sum[base + 2] / w;
                    let mean_sq = variance_sum[pixel] / w;
                    (mean_sq - mean * mean).max(0.0).sqrt() / mean.max(1e-6)
                } else {
                    f32::INFINITY
                };
                if has_noise {
                    if let Some(buf) = self.channels.get_mut(&OutputType::Noise) {
                        buf.set_scalar(x, y, noise);
                    }
                }
                if has_convergence {
                    if let Some(buf) = self.channels.get_mut(&OutputType::Convergence) {
                        buf.set_scalar(x, y, if noise < threshold { 1.0 } else { 0.0 });
                    }
                }
            }
        }
    }

    /// Materialize a buffer view for `channel`, running the imaging
    /// pipeline first if `run_pipeline` and this is an `*_IMAGEPIPELINE`
    /// channel.
    pub fn get_output(&self, channel: OutputType, run_pipeline: bool, pipe: &pipeline::Pipeline) -> Result<Vec<f32>> {
        let buf = self
            .channels
            .get(&channel)
            .ok_or_else(|| RenderError::Configuration(format!("film has no {channel:?} output configured")))?;
        let mut raw = Vec::with_capacity((self.width * self.height) as usize * buf.components);
        for y in 0..self.height {
            for x in 0..self.width {
                raw.extend(buf.get(x, y));
            }
        }
        if run_pipeline && matches!(channel, OutputType::RgbImagepipeline | OutputType::RgbaImagepipeline) {
            pipe.apply(&mut raw, self.width, self.height, buf.components);
        }
        Ok(raw)
    }

    /// In-place channel update without a full pipeline re-run. Per the
    /// documented resolution of the "which channels support in-place
    /// update" open question, only `USER_IMPORTANCE` is wired; any other
    /// channel is a configuration error rather than a silent no-op.
    pub fn update_output(&mut self, channel: OutputType, x: u32, y: u32, value: f32) -> Result<()> {
        if channel != OutputType::UserImportance {
            return Err(RenderError::Configuration(format!("updateOutput is not supported for {channel:?}")));
        }
        self.splat(x, y, channel, &[value], 1.0);
        Ok(())
    }

    pub fn convergence(&self) -> Option<&ChannelBuffer> {
        self.channels.get(&OutputType::Convergence)
    }

    /// Iterate every configured channel, for a resume-file writer that needs
    /// to persist raw accumulator state.
    pub fn channels(&self) -> impl Iterator<Item = (&OutputType, &ChannelBuffer)> {
        self.channels.iter()
    }

    /// Replace (or add) one channel's buffer outright, used when restoring a
    /// resume file.
    pub fn set_channel(&mut self, ty: OutputType, buffer: ChannelBuffer) {
        self.channels.insert(ty, buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splat_then_get_returns_weighted_average() {
        let mut film = Film::new(2, 2, &[OutputType::Rgb]);
        film.splat_radiance(0, 0, Spectrum::new(1.0, 0.0, 0.0), 1.0);
        film.splat_radiance(0, 0, Spectrum::new(0.0, 1.0, 0.0), 1.0);
        let pixel = film.channels[&OutputType::Rgb].get(0, 0);
        assert!((pixel[0] - 0.5).abs() < 1e-6);
        assert!((pixel[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clear_zeroes_every_channel() {
        let mut film = Film::new(1, 1, &[OutputType::Rgb, OutputType::Alpha]);
        film.splat_radiance(0, 0, Spectrum::WHITE, 1.0);
        film.clear();
        assert_eq!(film.channels[&OutputType::Rgb].get(0, 0), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn add_film_merges_independent_accumulations() {
        let mut a = Film::new(1, 1, &[OutputType::Rgb]);
        let mut b = Film::new(1, 1, &[OutputType::Rgb]);
        a.splat_radiance(0, 0, Spectrum::WHITE, 1.0);
        b.splat_radiance(0, 0, Spectrum::WHITE, 1.0);
        a.add_film(&b);
        let pixel = a.channels[&OutputType::Rgb].get(0, 0);
        assert!((pixel[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn update_output_rejects_unsupported_channels() {
        let mut film = Film::new(1, 1, &[OutputType::Alpha]);
        assert!(film.update_output(OutputType::Alpha, 0, 0, 1.0).is_err());
    }

    #[test]
    fn identical_samples_have_zero_noise() {
        let mut film = Film::new(1, 1, &[OutputType::Rgb]);
        for _ in 0..8 {
            film.splat_radiance(0, 0, Spectrum::splat(0.5), 1.0);
        }
        assert!(film.mean_relative_noise() < 1e-5);
    }

    #[test]
    fn scattered_samples_report_nonzero_noise() {
        let mut film = Film::new(1, 1, &[OutputType::Rgb]);
        film.splat_radiance(0, 0, Spectrum::BLACK, 1.0);
        film.splat_radiance(0, 0, Spectrum::splat(10.0), 1.0);
        assert!(film.mean_relative_noise() > 0.5);
    }

    #[test]
    fn refresh_noise_channels_marks_a_converged_pixel() {
        let mut film = Film::new(1, 1, &[OutputType::Rgb, OutputType::Noise, OutputType::Convergence]);
        for _ in 0..8 {
            film.splat_radiance(0, 0, Spectrum::splat(0.5), 1.0);
        }
        film.refresh_noise_channels(0.05);
        assert!(film.channels[&OutputType::Noise].get(0, 0)[0] < 0.05);
        assert_eq!(film.channels[&OutputType::Convergence].get(0, 0)[0], 1.0);
    }
}
