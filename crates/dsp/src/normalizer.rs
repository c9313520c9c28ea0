//! Rolling Normalizer (C5): per (channel, frequency) running mean/variance
//! by Welford's algorithm (spec §4.5), grounded on `RollingStats.h`.

use elemem_types::Powers;

#[derive(Debug, Clone)]
struct CellStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl CellStats {
    fn new() -> Self {
        Self { count: 0, mean: 0.0, m2: 0.0 }
    }

    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn sample_std(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count as f64 - 1.0)).sqrt()
        }
    }

    fn zscore(&self, value: f64, ignore_inf_and_nan: bool) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let std = self.sample_std();
        if std == 0.0 {
            return 0.0;
        }
        let z = (value - self.mean) / std;
        if ignore_inf_and_nan && !z.is_finite() {
            0.0
        } else {
            z
        }
    }
}

/// Running per-(channel, frequency) statistics over a stream of [`Powers`].
/// `update` and `zscore` must be invoked from a single serialized caller
/// (spec §4.5 total order requirement); this type enforces nothing about
/// concurrency itself, it is simply `!Sync`-by-convention within a worker.
pub struct RollingNormalizer {
    n_chan: usize,
    cells: Vec<CellStats>,
}

impl RollingNormalizer {
    pub fn new(n_freq: usize, n_chan: usize) -> Self {
        Self {
            n_chan,
            cells: (0..n_freq * n_chan).map(|_| CellStats::new()).collect(),
        }
    }

    pub fn reset(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell = CellStats::new();
        }
    }

    #[inline]
    fn index(&self, freq: usize, chan: usize) -> usize {
        freq * self.n_chan + chan
    }

    pub fn update(&mut self, powers: &Powers) {
        let (n_freq, n_chan, n_time) = powers.dims();
        for f in 0..n_freq {
            for c in 0..n_chan {
                let idx = self.index(f, c);
                for t in 0..n_time {
                    self.cells[idx].update(powers.get(f, c, t));
                }
            }
        }
    }

    pub fn zscore(&self, powers: &Powers, ignore_inf_and_nan: bool) -> Powers {
        let (n_freq, n_chan, n_time) = powers.dims();
        let mut out = Powers::zeros(powers.sampling_rate, n_freq, n_chan, n_time);
        for f in 0..n_freq {
            for c in 0..n_chan {
                let idx = self.index(f, c);
                for t in 0..n_time {
                    let value = powers.get(f, c, t);
                    out.set(f, c, t, self.cells[idx].zscore(value, ignore_inf_and_nan));
                }
            }
        }
        out
    }

    pub fn mean_and_sample_std(&self, freq: usize, chan: usize) -> (f64, f64) {
        let idx = self.index(freq, chan);
        (self.cells[idx].mean, self.cells[idx].sample_std())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welford_matches_scenario_s4() {
        let mut stats = CellStats::new();
        for &v in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.update(v);
        }
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.sample_std() - 2.138_089_935).abs() < 1e-6);
        assert_eq!(stats.zscore(5.0, true), 0.0);
    }

    #[test]
    fn single_sample_zscore_is_zero() {
        let mut normalizer = RollingNormalizer::new(1, 1);
        let mut powers = Powers::zeros(1000, 1, 1, 1);
        powers.set(0, 0, 0, 3.0);
        normalizer.update(&powers);
        let z = normalizer.zscore(&powers, true);
        assert_eq!(z.get(0, 0, 0), 0.0);
    }
}
