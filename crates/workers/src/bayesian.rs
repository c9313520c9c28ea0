//! Black-box closed-loop parameter search interface (spec §9 design note):
//! the core only owns the `{add_sample, get_next_sample, best}` protocol,
//! not the numerical internals of the optimizer.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait BayesianSearch: Send {
    fn add_sample(&mut self, params: &[f64], value: f64);
    fn get_next_sample(&mut self) -> Vec<f64>;
    fn best(&self) -> Vec<f64>;
}

/// A bounded random-search stand-in for the real Bayesian optimizer: it
/// satisfies the protocol and keeps the argmax sample seen so far, without
/// claiming to model the objective.
pub struct BoundedRandomSearch {
    bounds: Vec<(f64, f64)>,
    rng: StdRng,
    best_params: Vec<f64>,
    best_value: f64,
    has_sample: bool,
}

impl BoundedRandomSearch {
    pub fn new(bounds: Vec<(f64, f64)>, seed: u64) -> Self {
        let rng = StdRng::seed_from_u64(seed);
        let best_params = bounds.iter().map(|(lo, _)| *lo).collect();
        Self {
            bounds,
            rng,
            best_params,
            best_value: f64::NEG_INFINITY,
            has_sample: false,
        }
    }
}

impl BayesianSearch for BoundedRandomSearch {
    fn add_sample(&mut self, params: &[f64], value: f64) {
        if !self.has_sample || value > self.best_value {
            self.best_value = value;
            self.best_params = params.to_vec();
            self.has_sample = true;
        }
    }

    fn get_next_sample(&mut self) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|(lo, hi)| self.rng.gen_range(*lo..=*hi))
            .collect()
    }

    fn best(&self) -> Vec<f64> {
        self.best_params.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_best_sample_seen() {
        let mut search = BoundedRandomSearch::new(vec![(0.0, 1.0)], 1);
        search.add_sample(&[0.2], 0.5);
        search.add_sample(&[0.7], 0.9);
        search.add_sample(&[0.4], 0.1);
        assert_eq!(search.best(), vec![0.7]);
    }

    #[test]
    fn samples_stay_within_bounds() {
        let mut search = BoundedRandomSearch::new(vec![(1.0, 2.0)], 42);
        for _ in 0..20 {
            let sample = search.get_next_sample();
            assert!(sample[0] >= 1.0 && sample[0] <= 2.0);
        }
    }
}
