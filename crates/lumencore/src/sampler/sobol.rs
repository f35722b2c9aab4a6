//! Low-discrepancy sampling.
//!
//! The original ships full Joe & Kuo direction-number tables for true Sobol
//! sequences across thousands of dimensions. This renders a simplified
//! deterministic construction instead: radical-inverse (van der Corput) base
//! 2 and base 3 sequences per dimension pair, each pixel's stream offset by
//! a scrambled Owen-style digit permutation keyed on the pixel coordinate so
//! adjacent pixels don't share the exact same low-discrepancy pattern. This
//! keeps the "deterministic per pixel, resumable, low-discrepancy" contract
//! without vendoring the direction-number tables (an Open Question resolved
//! this way — see the grounding ledger).

use super::{SampleKind, Sampler};

fn radical_inverse_base2(mut bits: u32) -> f32 {
    bits = bits.reverse_bits();
    bits as f32 * 2.328_306_4e-10
}

fn radical_inverse(mut index: u64, base: u64) -> f32 {
    let mut result = 0.0f64;
    let mut frac = 1.0f64 / base as f64;
    while index > 0 {
        result += (index % base) as f64 * frac;
        index /= base;
        frac /= base as f64;
    }
    result as f32
}

fn owen_scramble(mut x: u32, seed: u32) -> u32 {
    x ^= x.wrapping_mul(0x6c50_b47c);
    x ^= x.rotate_right(17);
    x ^= seed;
    x = x.wrapping_mul(0x92c8_7a1b);
    x ^= x >> 15;
    x
}

pub struct SobolSampler {
    pixel_seed: u32,
    dimension: u32,
    index: u64,
}

impl SobolSampler {
    pub fn new(seed: u32) -> Self {
        SobolSampler { pixel_seed: seed, dimension: 0, index: 0 }
    }

    fn next_dimension(&mut self) -> u32 {
        let d = self.dimension;
        self.dimension += 1;
        d
    }
}

impl Sampler for SobolSampler {
    fn start_pixel(&mut self, x: u32, y: u32, sample_index: u64) {
        self.pixel_seed = owen_scramble(x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663), self.pixel_seed);
        self.dimension = 0;
        self.index = sample_index;
    }

    fn get_1d(&mut self, _kind: SampleKind) -> f32 {
        let dim = self.next_dimension();
        let scrambled_index = owen_scramble(self.index as u32, self.pixel_seed.wrapping_add(dim));
        radical_inverse_base2(scrambled_index)
    }

    fn get_2d(&mut self, _kind: SampleKind) -> (f32, f32) {
        let dim = self.next_dimension();
        let scrambled_index = owen_scramble(self.index as u32, self.pixel_seed.wrapping_add(dim));
        let a = radical_inverse_base2(scrambled_index);
        let b = radical_inverse(self.index.wrapping_add(dim as u64), 3);
        (a, b)
    }

    fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.pixel_seed.to_le_bytes());
        out.extend_from_slice(&self.dimension.to_le_bytes());
        out.extend_from_slice(&self.index.to_le_bytes());
        out
    }

    fn restore_state(&mut self, bytes: &[u8]) {
        if bytes.len() < 16 {
            return;
        }
        self.pixel_seed = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        self.dimension = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        self.index = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pixel_same_index_reproduces_exactly() {
        let mut a = SobolSampler::new(9);
        let mut b = SobolSampler::new(9);
        a.start_pixel(4, 7, 2);
        b.start_pixel(4, 7, 2);
        assert_eq!(a.get_2d(SampleKind::Camera), b.get_2d(SampleKind::Camera));
    }

    #[test]
    fn different_pixels_decorrelate() {
        let mut a = SobolSampler::new(9);
        let mut b = SobolSampler::new(9);
        a.start_pixel(0, 0, 0);
        b.start_pixel(1, 0, 0);
        assert_ne!(a.get_1d(SampleKind::Bsdf), b.get_1d(SampleKind::Bsdf));
    }

    #[test]
    fn state_round_trip_resumes_sequence() {
        let mut a = SobolSampler::new(3);
        a.start_pixel(1, 1, 0);
        let _ = a.get_1d(SampleKind::Camera);
        let state = a.save_state();
        let next = a.get_1d(SampleKind::Bsdf);

        let mut b = SobolSampler::new(0);
        b.restore_state(&state);
        assert_eq!(b.get_1d(SampleKind::Bsdf), next);
    }
}
