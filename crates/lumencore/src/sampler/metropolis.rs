//! Metropolis-Hastings sampling: most proposals are small perturbations of
//! the previous accepted sample (exploiting locally-correlated high-
//! contribution paths), with an occasional large, fully independent jump so
//! the chain doesn't get stuck in one region of path space.

use super::{SampleKind, Sampler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LARGE_STEP_PROBABILITY: f32 = 0.3;
const MUTATION_SIZE: f32 = 1.0 / 1024.0;

#[derive(Clone, Copy)]
struct SampleRecord {
    value: f32,
    /// Iteration this coordinate was last modified, so a perturbation that
    /// touches a stale coordinate lazily replays the missed large steps.
    modify_iteration: u64,
}

pub struct MetropolisSampler {
    rng: StdRng,
    records: Vec<SampleRecord>,
    cursor: usize,
    iteration: u64,
    large_step: bool,
    last_large_step_iteration: u64,
    backup: Vec<(usize, SampleRecord)>,
}

impl MetropolisSampler {
    pub fn new(seed: u64) -> Self {
        MetropolisSampler {
            rng: StdRng::seed_from_u64(seed),
            records: Vec::new(),
            cursor: 0,
            iteration: 0,
            large_step: true,
            last_large_step_iteration: 0,
            backup: Vec::new(),
        }
    }

    fn ensure_len(&mut self, len: usize) {
        while self.records.len() < len {
            self.records.push(SampleRecord { value: self.rng.r#gen(), modify_iteration: 0 });
        }
    }

    fn mutate(&mut self, index: usize) -> f32 {
        self.ensure_len(index + 1);
        let record = self.records[index];
        self.backup.push((index, record));

        let value = if self.large_step {
            self.rng.r#gen::<f32>()
        } else {
            // Lazily replay any large step that happened since this
            // coordinate was last touched, then apply a small perturbation.
            let base = if record.modify_iteration < self.last_large_step_iteration { self.rng.r#gen::<f32>() } else { record.value };
            let sign: f32 = if self.rng.r#gen::<bool>() { 1.0 } else { -1.0 };
            let delta = sign * MUTATION_SIZE * self.rng.r#gen::<f32>();
            (base + delta).rem_euclid(1.0)
        };
        self.records[index] = SampleRecord { value, modify_iteration: self.iteration };
        value
    }

    /// Begin a new proposal. Call [`accept`]/[`reject`] once the resulting
    /// path's contribution is known.
    pub fn start_iteration(&mut self) {
        self.cursor = 0;
        self.backup.clear();
        self.iteration += 1;
        self.large_step = self.rng.r#gen::<f32>() < LARGE_STEP_PROBABILITY;
    }

    pub fn accept(&mut self) {
        if self.large_step {
            self.last_large_step_iteration = self.iteration;
        }
    }

    pub fn reject(&mut self) {
        for (index, record) in self.backup.drain(..) {
            self.records[index] = record;
        }
        self.iteration -= 1;
    }
}

impl Sampler for MetropolisSampler {
    fn start_pixel(&mut self, _x: u32, _y: u32, _sample_index: u64) {
        self.start_iteration();
    }

    fn get_1d(&mut self, _kind: SampleKind) -> f32 {
        let idx = self.cursor;
        self.cursor += 1;
        self.mutate(idx)
    }

    fn get_2d(&mut self, kind: SampleKind) -> (f32, f32) {
        (self.get_1d(kind), self.get_1d(kind))
    }

    fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.records.len() * 4);
        out.extend_from_slice(&self.iteration.to_le_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        for r in &self.records {
            out.extend_from_slice(&r.value.to_le_bytes());
        }
        out
    }

    fn restore_state(&mut self, bytes: &[u8]) {
        if bytes.len() < 12 {
            return;
        }
        self.iteration = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let count = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        self.records.clear();
        for i in 0..count {
            let off = 12 + i * 4;
            if off + 4 > bytes.len() {
                break;
            }
            let value = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            self.records.push(SampleRecord { value, modify_iteration: self.iteration });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_mutation_restores_previous_values() {
        let mut s = MetropolisSampler::new(11);
        s.start_iteration();
        let first = s.get_1d(SampleKind::Bsdf);
        s.start_iteration();
        let _ = s.get_1d(SampleKind::Bsdf);
        s.reject();
        assert_eq!(s.records[0].value, first);
    }

    #[test]
    fn state_round_trips() {
        let mut s = MetropolisSampler::new(5);
        s.start_iteration();
        let _ = s.get_2d(SampleKind::Camera);
        s.accept();
        let bytes = s.save_state();
        let mut restored = MetropolisSampler::new(0);
        restored.restore_state(&bytes);
        assert_eq!(restored.records.len(), s.records.len());
    }
}
