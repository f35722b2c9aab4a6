//! Independent uniform sampling: every call draws a fresh, uncorrelated
//! value. The simplest strategy and the baseline the others are checked
//! against for variance.

use super::{SampleKind, Sampler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct RandomSampler {
    seed: u64,
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        RandomSampler { seed, rng: StdRng::seed_from_u64(seed) }
    }
}

impl Sampler for RandomSampler {
    fn start_pixel(&mut self, x: u32, y: u32, sample_index: u64) {
        let mixed = self.seed ^ ((x as u64) << 32) ^ (y as u64) ^ sample_index.wrapping_mul(0x9E3779B97F4A7C15);
        self.rng = StdRng::seed_from_u64(mixed);
    }

    fn get_1d(&mut self, _kind: SampleKind) -> f32 {
        self.rng.r#gen::<f32>()
    }

    fn get_2d(&mut self, _kind: SampleKind) -> (f32, f32) {
        (self.rng.r#gen::<f32>(), self.rng.r#gen::<f32>())
    }

    fn save_state(&self) -> Vec<u8> {
        self.seed.to_le_bytes().to_vec()
    }

    fn restore_state(&mut self, bytes: &[u8]) {
        if bytes.len() >= 8 {
            self.seed = u64::from_le_bytes(bytes[..8].try_into().unwrap());
            self.rng = StdRng::seed_from_u64(self.seed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pixel_and_seed_are_not_required_to_repeat() {
        let mut a = RandomSampler::new(1);
        let mut b = RandomSampler::new(2);
        a.start_pixel(0, 0, 0);
        b.start_pixel(0, 0, 0);
        assert_ne!(a.get_1d(SampleKind::Bsdf), b.get_1d(SampleKind::Bsdf));
    }

    #[test]
    fn state_round_trips() {
        let mut a = RandomSampler::new(42);
        let state = a.save_state();
        let mut b = RandomSampler::new(0);
        b.restore_state(&state);
        assert_eq!(b.seed, 42);
    }
}
