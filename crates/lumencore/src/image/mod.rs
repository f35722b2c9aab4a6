//! # Image-Map Store
//!
//! An `ImageMap` is a typed 2-D pixel array plus the read policies (wrap
//! mode, filter mode, channel selection) the texture graph needs at
//! evaluation time. Decoding a file into one of these is out of scope for
//! this crate — callers hand in already-typed pixel data (the "raw typed
//! pixel arrays" the top-level scope note describes); `ImageMap` only owns
//! storage and read policy from that point on.
//!
//! ## Storage
//!
//! Three element types (`Byte`, `Half`, `Float`) crossed with 1..4 channels,
//! held as one of three flat `Vec`s in [`PixelStorage`]. The storage type
//! never changes except through an explicit [`ImageMap::convert_storage`]
//! call — reads always promote to `f32` internally regardless of the
//! backing type.
//!
//! ## Mip selection
//!
//! [`MipImageMap`] holds levels sorted from largest to smallest. Given a
//! `(width_hint, height_hint)`, [`MipImageMap::select_level`] walks from the
//! smallest level upward and returns the first one that meets or exceeds the
//! hint in both dimensions, falling back to the largest level if none does.
//! This is the entire mip policy — there is no dynamic cascade at trace
//! time.

pub mod colorspace;
pub mod resize;

use crate::color::Spectrum;
use crate::error::{RenderError, Result};
use glam::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapMode {
    Repeat,
    Clamp,
    Black,
    White,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest,
    Bilinear,
}

/// Backing pixel storage. The element type is independent of channel count;
/// `channels` records how many of the 4 components in the packed RGBA pixel
/// are meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PixelStorage {
    Byte(Vec<u8>),
    /// IEEE-754 binary16, stored as its raw bit pattern (no `half` crate
    /// dependency — conversion helpers live in this module).
    Half(Vec<u16>),
    Float(Vec<f32>),
}

pub fn half_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 1) as u32;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;
    let f_bits = if exponent == 0 {
        if mantissa == 0 {
            sign << 31
        } else {
            // Subnormal half -> normalize into a normal f32.
            let mut e = exponent;
            let mut m = mantissa;
            while m & 0x400 == 0 {
                m <<= 1;
                e = e.wrapping_sub(1);
            }
            m &= 0x3ff;
            let f_exp = (e.wrapping_add(1).wrapping_sub(15).wrapping_add(127)) & 0xff;
            (sign << 31) | (f_exp << 23) | (m << 13)
        }
    } else if exponent == 0x1f {
        (sign << 31) | 0xff << 23 | (mantissa << 13)
    } else {
        let f_exp = exponent - 15 + 127;
        (sign << 31) | (f_exp << 23) | (mantissa << 13)
    };
    f32::from_bits(f_bits)
}

pub fn f32_to_half(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7fffff;
    if exponent == 0xff {
        return sign | 0x7c00 | if mantissa != 0 { 1 } else { 0 };
    }
    let half_exp = exponent - 127 + 15;
    if half_exp >= 0x1f {
        return sign | 0x7c00; // overflow -> inf
    }
    if half_exp <= 0 {
        if half_exp < -10 {
            return sign; // too small -> zero
        }
        let m = (mantissa | 0x800000) >> (1 - half_exp + 13);
        return sign | m as u16;
    }
    sign | ((half_exp as u16) << 10) | (mantissa >> 13) as u16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMap {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub storage: PixelStorage,
    pub wrap: WrapMode,
    pub filter: FilterMode,
    mean_spectrum: Spectrum,
    mean_luminance: f32,
}

impl ImageMap {
    pub fn new(width: u32, height: u32, channels: u8, storage: PixelStorage) -> Result<Self> {
        if !(1..=4).contains(&channels) {
            return Err(RenderError::Invariant(format!("unsupported channel count {channels}")));
        }
        let expected = width as usize * height as usize * channels as usize;
        let actual = match &storage {
            PixelStorage::Byte(v) => v.len(),
            PixelStorage::Half(v) => v.len(),
            PixelStorage::Float(v) => v.len(),
        };
        if actual != expected {
            return Err(RenderError::Invariant(format!(
                "pixel buffer length {actual} does not match width*height*channels {expected}"
            )));
        }
        let mut map = ImageMap {
            width,
            height,
            channels,
            storage,
            wrap: WrapMode::Repeat,
            filter: FilterMode::Bilinear,
            mean_spectrum: Spectrum::BLACK,
            mean_luminance: 0.0,
        };
        map.recompute_means();
        Ok(map)
    }

    fn recompute_means(&mut self) {
        let n = (self.width * self.height).max(1) as f32;
        let mut sum = Spectrum::BLACK;
        for y in 0..self.height {
            for x in 0..self.width {
                sum += self.texel_spectrum(x as i64, y as i64);
            }
        }
        self.mean_spectrum = sum / n;
        self.mean_luminance = self.mean_spectrum.luminance();
    }

    pub fn mean_spectrum(&self) -> Spectrum {
        self.mean_spectrum
    }

    pub fn mean_luminance(&self) -> f32 {
        self.mean_luminance
    }

    fn wrap_coord(&self, s: i64, extent: u32) -> Option<i64> {
        let extent = extent as i64;
        match self.wrap {
            WrapMode::Repeat => Some(s.rem_euclid(extent)),
            WrapMode::Clamp => Some(s.clamp(0, extent - 1)),
            WrapMode::Black | WrapMode::White => {
                if s < 0 || s >= extent {
                    None
                } else {
                    Some(s)
                }
            }
        }
    }

    fn out_of_bounds_value(&self) -> f32 {
        match self.wrap {
            WrapMode::White => 1.0,
            _ => 0.0,
        }
    }

    /// Raw component fetch at integer texel coordinates, honoring wrap mode.
    pub fn texel_component(&self, s: i64, t: i64, c: u8) -> f32 {
        let x = match self.wrap_coord(s, self.width) {
            Some(x) => x,
            None => return self.out_of_bounds_value(),
        };
        let y = match self.wrap_coord(t, self.height) {
            Some(y) => y,
            None => return self.out_of_bounds_value(),
        };
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize + c.min(self.channels - 1) as usize;
        match &self.storage {
            PixelStorage::Byte(v) => v[idx] as f32 / 255.0,
            PixelStorage::Half(v) => half_to_f32(v[idx]),
            PixelStorage::Float(v) => v[idx],
        }
    }

    pub fn texel_spectrum(&self, s: i64, t: i64) -> Spectrum {
        match self.channels {
            1 => {
                let v = self.texel_component(s, t, 0);
                Spectrum::splat(v)
            }
            _ => Spectrum::new(
                self.texel_component(s, t, 0),
                self.texel_component(s, t, 1),
                self.texel_component(s, t, 2.min(self.channels - 1)),
            ),
        }
    }

    pub fn texel_alpha(&self, s: i64, t: i64) -> f32 {
        if self.channels >= 4 {
            self.texel_component(s, t, 3)
        } else {
            1.0
        }
    }

    fn uv_to_texel(&self, uv: Vec2) -> (f32, f32) {
        (uv.x * self.width as f32 - 0.5, uv.y * self.height as f32 - 0.5)
    }

    pub fn get_spectrum(&self, uv: Vec2) -> Spectrum {
        let (fx, fy) = self.uv_to_texel(uv);
        match self.filter {
            FilterMode::Nearest => self.texel_spectrum(fx.round() as i64, fy.round() as i64),
            FilterMode::Bilinear => {
                let x0 = fx.floor();
                let y0 = fy.floor();
                let dx = fx - x0;
                let dy = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let c00 = self.texel_spectrum(x0, y0);
                let c10 = self.texel_spectrum(x0 + 1, y0);
                let c01 = self.texel_spectrum(x0, y0 + 1);
                let c11 = self.texel_spectrum(x0 + 1, y0 + 1);
                let top = Spectrum::lerp(c00, c10, dx);
                let bottom = Spectrum::lerp(c01, c11, dx);
                Spectrum::lerp(top, bottom, dy)
            }
        }
    }

    pub fn get_float(&self, uv: Vec2) -> f32 {
        self.get_spectrum(uv).luminance()
    }

    pub fn get_alpha(&self, uv: Vec2) -> f32 {
        let (fx, fy) = self.uv_to_texel(uv);
        self.texel_alpha(fx.round() as i64, fy.round() as i64)
    }

    /// Central-difference UV partials, used by bump/normal-map adapters in
    /// the texture graph.
    pub fn get_duv(&self, uv: Vec2) -> (Spectrum, Spectrum) {
        let du = 1.0 / self.width.max(1) as f32;
        let dv = 1.0 / self.height.max(1) as f32;
        let ddu = (self.get_spectrum(uv + Vec2::new(du, 0.0)) - self.get_spectrum(uv - Vec2::new(du, 0.0))) * 0.5;
        let ddv = (self.get_spectrum(uv + Vec2::new(0.0, dv)) - self.get_spectrum(uv - Vec2::new(0.0, dv))) * 0.5;
        (ddu, ddv)
    }

    /// Reduce to a single requested channel, or a weighted-mean luminance
    /// when `channel` is `None`.
    pub fn select_channel(&self, uv: Vec2, channel: Option<u8>) -> f32 {
        match channel {
            Some(c) => self.texel_component_filtered(uv, c),
            None => self.get_float(uv),
        }
    }

    fn texel_component_filtered(&self, uv: Vec2, c: u8) -> f32 {
        let (fx, fy) = self.uv_to_texel(uv);
        match self.filter {
            FilterMode::Nearest => self.texel_component(fx.round() as i64, fy.round() as i64, c),
            FilterMode::Bilinear => {
                let x0 = fx.floor();
                let y0 = fy.floor();
                let dx = fx - x0;
                let dy = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let c00 = self.texel_component(x0, y0, c);
                let c10 = self.texel_component(x0 + 1, y0, c);
                let c01 = self.texel_component(x0, y0 + 1, c);
                let c11 = self.texel_component(x0 + 1, y0 + 1, c);
                let top = c00 + (c10 - c00) * dx;
                let bottom = c01 + (c11 - c01) * dx;
                top + (bottom - top) * dy
            }
        }
    }

    /// Convert the backing storage to a different element type in place.
    /// Values already in `[0, 1]` survive a round trip through `Byte`
    /// losslessly to 8 bits of precision; the storage type itself is
    /// otherwise inert to reads, which always promote to `f32`.
    pub fn convert_storage(&mut self, to: StorageKind) {
        let floats: Vec<f32> = match &self.storage {
            PixelStorage::Byte(v) => v.iter().map(|&b| b as f32 / 255.0).collect(),
            PixelStorage::Half(v) => v.iter().map(|&h| half_to_f32(h)).collect(),
            PixelStorage::Float(v) => v.clone(),
        };
        self.storage = match to {
            StorageKind::Byte => PixelStorage::Byte(floats.iter().map(|&f| (f.clamp(0.0, 1.0) * 255.0).round() as u8).collect()),
            StorageKind::Half => PixelStorage::Half(floats.iter().map(|&f| f32_to_half(f)).collect()),
            StorageKind::Float => PixelStorage::Float(floats),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Byte,
    Half,
    Float,
}

/// A mip chain: levels ordered from largest (index 0) to smallest.
#[derive(Debug, Clone)]
pub struct MipImageMap {
    levels: Vec<ImageMap>,
}

impl MipImageMap {
    pub fn new(mut levels: Vec<ImageMap>) -> Self {
        levels.sort_by(|a, b| (b.width * b.height).cmp(&(a.width * a.height)));
        MipImageMap { levels }
    }

    pub fn base(&self) -> &ImageMap {
        &self.levels[0]
    }

    /// Smallest level whose dimensions both meet or exceed the hint; falls
    /// back to the largest level if none does.
    pub fn select_level(&self, width_hint: u32, height_hint: u32) -> &ImageMap {
        self.levels
            .iter()
            .rev()
            .find(|lvl| lvl.width >= width_hint && lvl.height >= height_hint)
            .unwrap_or(&self.levels[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_2x2(values: [f32; 4]) -> ImageMap {
        ImageMap::new(2, 2, 1, PixelStorage::Float(values.to_vec())).unwrap()
    }

    #[test]
    fn repeat_wrap_is_periodic() {
        let mut m = make_2x2([0.0, 0.5, 0.5, 1.0]);
        m.wrap = WrapMode::Repeat;
        for k in -3..3 {
            assert_eq!(m.texel_component(0 + k * 2, 0, 0), m.texel_component(0, 0, 0));
        }
    }

    #[test]
    fn half_f32_roundtrip() {
        for v in [0.0f32, 1.0, -1.0, 0.5, 3.14159, 65504.0, 1e-5] {
            let h = f32_to_half(v);
            let back = half_to_f32(h);
            assert!((back - v).abs() / v.abs().max(1.0) < 2e-3, "{v} -> {back}");
        }
    }

    #[test]
    fn mip_select_picks_smallest_sufficient_level() {
        let levels = vec![make_2x2([0.0; 4]), ImageMap::new(1, 1, 1, PixelStorage::Float(vec![0.0])).unwrap()];
        let mip = MipImageMap::new(levels);
        let chosen = mip.select_level(2, 2);
        assert_eq!((chosen.width, chosen.height), (2, 2));
        let chosen_small = mip.select_level(1, 1);
        assert_eq!((chosen_small.width, chosen_small.height), (1, 1));
    }

    #[test]
    fn storage_length_mismatch_is_invariant_error() {
        let err = ImageMap::new(2, 2, 3, PixelStorage::Float(vec![0.0; 4]));
        assert!(err.is_err());
    }
}
