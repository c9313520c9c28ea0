//! Feature Pipeline (C4): bipolar re-reference, end mirroring, Morlet
//! wavelet transform, mirror removal, log-transform, time-average,
//! artifact detection (spec §4.4), grounded on `FeatureFilters.cpp`.

use elemem_types::{BipolarPair, ElememError, Powers, RawFrame};
use num_complex::Complex64;
use std::f64::consts::PI;

/// How the log-transform clamps a power value before taking `log10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// `max(value, min_power_clamp)`.
    Clamp,
    /// `value + min_power_clamp`, for legacy compatibility.
    Epsilon,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub mirror_ms: u64,
    pub frequencies_hz: &'static [f64],
    pub wavelet_cycles: f64,
    pub min_power_clamp: f64,
    pub log_mode: LogMode,
    pub ignore_inf_and_nan: bool,
    pub artifact_diff_order: usize,
    pub artifact_threshold: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mirror_ms: 1000,
            frequencies_hz: &[4.0, 8.0, 16.0, 32.0, 64.0],
            wavelet_cycles: 6.0,
            min_power_clamp: 1e-10,
            log_mode: LogMode::Clamp,
            ignore_inf_and_nan: true,
            artifact_diff_order: 10,
            artifact_threshold: 10,
        }
    }
}

/// Step 1: for each declared pair, `out[i] = frame[p] - frame[n]` as f64.
pub fn bipolar_reference(frame: &RawFrame, pairs: &[BipolarPair]) -> Result<Vec<Vec<f64>>, ElememError> {
    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let pos = frame
            .channel(pair.pos as usize)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ElememError::bounds(format!("channel {} missing or empty", pair.pos)))?;
        let neg = frame
            .channel(pair.neg as usize)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ElememError::bounds(format!("channel {} missing or empty", pair.neg)))?;
        if pos.len() != neg.len() {
            return Err(ElememError::bounds("bipolar pair channels have mismatched lengths"));
        }
        out.push(pos.iter().zip(neg).map(|(&p, &n)| p as f64 - n as f64).collect());
    }
    Ok(out)
}

/// Step 2: mirrors `m` samples at each end (spec §4.4 step 2 / S3).
pub fn mirror_ends(channel: &[f64], m: usize) -> Result<Vec<f64>, ElememError> {
    let l = channel.len();
    if m >= l {
        return Err(ElememError::bounds("mirror width must be smaller than channel length"));
    }
    let mut out = Vec::with_capacity(l + 2 * m);
    out.extend((1..=m).rev().map(|i| channel[i]));
    out.extend_from_slice(channel);
    out.extend((0..m).map(|i| channel[l - 2 - i]));
    Ok(out)
}

/// Strips the `m` mirrored samples back off both ends.
pub fn remove_mirror_ends(channel: &[f64], m: usize) -> &[f64] {
    &channel[m..channel.len() - m]
}

/// Step 3: complex Morlet wavelet convolution, one frequency at a time,
/// returning instantaneous power `|.|^2`.
pub fn morlet_power(signal: &[f64], sampling_rate: u32, freq_hz: f64, cycles: f64) -> Vec<f64> {
    let sr = sampling_rate as f64;
    let std_t = cycles / (2.0 * PI * freq_hz);
    // Support half-width in samples; 3.5 std devs captures the effective kernel.
    let half_len = ((3.5 * std_t * sr).ceil() as usize).max(1);
    let kernel: Vec<Complex64> = (-(half_len as isize)..=(half_len as isize))
        .map(|n| {
            let t = n as f64 / sr;
            let gauss = (-t * t / (2.0 * std_t * std_t)).exp();
            let norm = 1.0 / (std_t * (2.0 * PI).sqrt()).sqrt();
            Complex64::from_polar(gauss * norm, 2.0 * PI * freq_hz * t)
        })
        .collect();

    let n = signal.len();
    let mut out = vec![0.0; n];
    for (i, out_val) in out.iter_mut().enumerate() {
        let mut acc = Complex64::new(0.0, 0.0);
        for (k, &kv) in kernel.iter().enumerate() {
            let offset = k as isize - half_len as isize;
            let idx = i as isize + offset;
            if idx >= 0 && (idx as usize) < n {
                acc += kv * signal[idx as usize];
            }
        }
        *out_val = acc.norm_sqr();
    }
    out
}

/// Statistical support (in samples) of the wavelet at `freq_hz`, used to
/// validate the mirroring width chosen upstream.
pub fn wavelet_support_samples(sampling_rate: u32, freq_hz: f64, cycles: f64) -> usize {
    let std_t = cycles / (2.0 * PI * freq_hz);
    ((3.5 * std_t * sampling_rate as f64).ceil() as usize).max(1)
}

/// Step 5: per-value log10 with the configured clamp mode.
pub fn log10_transform(value: f64, min_power_clamp: f64, mode: LogMode) -> f64 {
    match mode {
        LogMode::Clamp => value.max(min_power_clamp).log10(),
        LogMode::Epsilon => (value + min_power_clamp).log10(),
    }
}

/// Step 7: n-th discrete difference; returns the count of zero entries.
pub fn artifact_zero_count(channel: &[f64], order: usize) -> Result<usize, ElememError> {
    let l = channel.len();
    if order >= l {
        return Err(ElememError::bounds("artifact diff order must be smaller than channel length"));
    }
    let mut cur = channel.to_vec();
    for _ in 0..order {
        cur = cur.windows(2).map(|w| w[1] - w[0]).collect();
    }
    Ok(cur.iter().filter(|&&v| v == 0.0).count())
}

/// Runs the full feature pipeline on one raw window, producing a
/// time-averaged, artifact-masked [`Powers`] array of shape
/// `[frequencies_hz.len(), pairs.len(), 1]`.
pub fn run(
    frame: &RawFrame,
    pairs: &[BipolarPair],
    settings: &PipelineSettings,
) -> Result<Powers, ElememError> {
    let sampling_rate = frame.sampling_rate;
    let m = (settings.mirror_ms * sampling_rate as u64 / 1000) as usize;

    let bipolar = bipolar_reference(frame, pairs)?;

    let min_freq = settings
        .frequencies_hz
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let min_support = wavelet_support_samples(sampling_rate, min_freq, settings.wavelet_cycles);
    if m < min_support {
        return Err(ElememError::bounds(
            "mirror width is smaller than the wavelet's statistical support at its lowest frequency",
        ));
    }

    let mut artifact_channel = vec![false; pairs.len()];
    for (c, signal) in bipolar.iter().enumerate() {
        if signal.is_empty() {
            artifact_channel[c] = true;
            continue;
        }
        let order = settings.artifact_diff_order;
        let threshold = settings.artifact_threshold;
        if order >= signal.len() || threshold >= signal.len() - order {
            return Err(ElememError::bounds(
                "artifact detection requires order < length and threshold < length - order",
            ));
        }
        let zero_count = artifact_zero_count(signal, order)?;
        if zero_count > threshold {
            artifact_channel[c] = true;
        }
    }

    let mut powers = Powers::zeros(sampling_rate, settings.frequencies_hz.len(), pairs.len(), 1);

    for (c, signal) in bipolar.iter().enumerate() {
        let mirrored = mirror_ends(signal, m)?;
        for (f_idx, &freq) in settings.frequencies_hz.iter().enumerate() {
            let power = morlet_power(&mirrored, sampling_rate, freq, settings.wavelet_cycles);
            let trimmed = remove_mirror_ends(&power, m);

            let logged: Vec<f64> = trimmed
                .iter()
                .map(|&v| log10_transform(v, settings.min_power_clamp, settings.log_mode))
                .collect();

            let sum: f64 = logged.iter().filter(|v| !settings.ignore_inf_and_nan || v.is_finite()).sum();
            let count = logged.iter().filter(|v| !settings.ignore_inf_and_nan || v.is_finite()).count();
            let mut avg = if count > 0 { sum / count as f64 } else { 0.0 };
            if settings.ignore_inf_and_nan && !avg.is_finite() {
                avg = 0.0;
            }

            powers.set(f_idx, c, 0, avg);
        }
    }

    for (c, &masked) in artifact_channel.iter().enumerate() {
        if masked {
            powers.zero_channel(c);
        }
    }

    Ok(powers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bipolar_pair_subtracts_exactly() {
        let mut frame = RawFrame::new(1000, 2);
        frame.set_channel(0, vec![10, 20, 30]);
        frame.set_channel(1, vec![1, 2, 3]);
        let pairs = vec![BipolarPair::new(0, 1).unwrap()];
        let out = bipolar_reference(&frame, &pairs).unwrap();
        assert_eq!(out[0], vec![9.0, 18.0, 27.0]);
    }

    #[test]
    fn mirror_matches_scenario_s3() {
        let input = [0.0, 1.0, 2.0, 3.0, 4.0];
        let mirrored = mirror_ends(&input, 2).unwrap();
        assert_eq!(mirrored, vec![2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn mirror_then_unmirror_is_identity() {
        let input: Vec<f64> = (0..20).map(|v| v as f64).collect();
        let mirrored = mirror_ends(&input, 3).unwrap();
        let restored = remove_mirror_ends(&mirrored, 3);
        assert_eq!(restored, input.as_slice());
    }

    #[test]
    fn artifact_count_rejects_invalid_bounds() {
        let short = vec![1.0, 2.0, 3.0];
        assert!(artifact_zero_count(&short, 10).is_err());
    }
}
