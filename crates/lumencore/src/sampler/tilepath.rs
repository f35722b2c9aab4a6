//! Tile-driven sampling for progressive/interactive rendering: the per-pixel
//! sequence is a plain [`SobolSampler`] reseeded from the pixel coordinate
//! and the pass number the owning [`crate::tile::Tile`] is currently on, so
//! two workers racing the same pixel on different passes never collide.

use super::sobol::SobolSampler;
use super::{SampleKind, Sampler};

pub struct TilePathSampler {
    seed: u32,
    inner: SobolSampler,
    pass: u64,
}

impl TilePathSampler {
    pub fn new(seed: u32) -> Self {
        TilePathSampler { seed, inner: SobolSampler::new(seed), pass: 0 }
    }

    /// Advance to the tile's next pass before sampling its pixels again.
    pub fn set_pass(&mut self, pass: u64) {
        self.pass = pass;
    }
}

impl Sampler for TilePathSampler {
    fn start_pixel(&mut self, x: u32, y: u32, _sample_index: u64) {
        self.inner.start_pixel(x, y, self.pass);
    }

    fn get_1d(&mut self, kind: SampleKind) -> f32 {
        self.inner.get_1d(kind)
    }

    fn get_2d(&mut self, kind: SampleKind) -> (f32, f32) {
        self.inner.get_2d(kind)
    }

    fn save_state(&self) -> Vec<u8> {
        let mut out = self.seed.to_le_bytes().to_vec();
        out.extend_from_slice(&self.pass.to_le_bytes());
        out.extend_from_slice(&self.inner.save_state());
        out
    }

    fn restore_state(&mut self, bytes: &[u8]) {
        if bytes.len() < 12 {
            return;
        }
        self.seed = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        self.pass = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        self.inner.restore_state(&bytes[12..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_pass_changes_the_sequence() {
        let mut s = TilePathSampler::new(1);
        s.start_pixel(2, 2, 0);
        let a = s.get_1d(SampleKind::Camera);
        s.set_pass(1);
        s.start_pixel(2, 2, 0);
        let b = s.get_1d(SampleKind::Camera);
        assert_ne!(a, b);
    }
}
