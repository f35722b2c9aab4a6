//! Discrete 1-D probability distributions built from a list of non-negative
//! weights (typically per-light power estimates). Used by the light
//! strategies (`UNIFORM`/`LOG_POWER`/`POWER`) and by every
//! [`crate::dlsc::DLSCEntry`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution1D {
    /// Cumulative distribution function, length `weights.len() + 1`,
    /// `cdf[0] == 0.0`, `cdf[last] == 1.0` (or all-uniform if every weight
    /// was zero).
    cdf: Vec<f32>,
    weights: Vec<f32>,
    weight_sum: f32,
}

impl Distribution1D {
    pub fn new(weights: Vec<f32>) -> Self {
        let n = weights.len();
        let mut cdf = vec![0.0f32; n + 1];
        let weight_sum: f32 = weights.iter().sum();
        if weight_sum > 0.0 {
            let mut running = 0.0;
            for (i, w) in weights.iter().enumerate() {
                running += w;
                cdf[i + 1] = running / weight_sum;
            }
            // Guard against float drift so a u==1.0 sample always resolves.
            if let Some(last) = cdf.last_mut() {
                *last = 1.0;
            }
        } else {
            for i in 0..=n {
                cdf[i] = if n == 0 { 0.0 } else { i as f32 / n as f32 };
            }
        }
        Distribution1D { cdf, weights, weight_sum }
    }

    pub fn uniform(n: usize) -> Self {
        Distribution1D::new(vec![1.0; n])
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// O(log n) inverse-CDF sample. Returns `(index, pdf)`.
    pub fn sample(&self, u: f32) -> (usize, f32) {
        debug_assert!(self.len() > 0, "sampling an empty distribution");
        let idx = match self.cdf.binary_search_by(|v| v.partial_cmp(&u).unwrap()) {
            Ok(i) => i,
            Err(i) => i,
        };
        let idx = idx.saturating_sub(1).min(self.weights.len() - 1);
        (idx, self.pdf(idx))
    }

    /// O(1) pdf lookup for a discrete index.
    pub fn pdf(&self, index: usize) -> f32 {
        if self.weight_sum > 0.0 {
            self.weights[index] / self.weight_sum
        } else {
            1.0 / self.weights.len() as f32
        }
    }

    pub fn weight(&self, index: usize) -> f32 {
        self.weights[index]
    }

    pub fn total_weight(&self) -> f32 {
        self.weight_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_distribution_is_weighted() {
        let d = Distribution1D::new(vec![1.0, 0.0, 3.0]);
        assert_eq!(d.sample(0.0).0, 0);
        assert_eq!(d.sample(0.99).0, 2);
        assert_eq!(d.pdf(1), 0.0);
    }

    #[test]
    fn all_zero_weights_fall_back_to_uniform() {
        let d = Distribution1D::new(vec![0.0, 0.0, 0.0]);
        for i in 0..3 {
            assert!((d.pdf(i) - 1.0 / 3.0).abs() < 1e-6);
        }
    }
}
