//! Core wire/data types: samples, frames, spectral power arrays and
//! stimulation parameters.

use crate::error::ElememError;
use serde::{Deserialize, Serialize};

/// A single signed 16-bit, microvolt-scaled acquisition sample.
pub type Sample = i16;

/// A mapping `channel -> ordered sequence of Sample`, all sharing one
/// sampling rate. A channel is "absent" for a tick when its vector is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub sampling_rate: u32,
    channels: Vec<Vec<Sample>>,
}

impl RawFrame {
    pub fn new(sampling_rate: u32, channel_count: usize) -> Self {
        Self {
            sampling_rate,
            channels: vec![Vec::new(); channel_count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, idx: usize) -> Option<&[Sample]> {
        self.channels.get(idx).map(|v| v.as_slice())
    }

    pub fn channel_mut(&mut self, idx: usize) -> Option<&mut Vec<Sample>> {
        self.channels.get_mut(idx)
    }

    pub fn channels(&self) -> &[Vec<Sample>] {
        &self.channels
    }

    pub fn set_channel(&mut self, idx: usize, data: Vec<Sample>) {
        if idx >= self.channels.len() {
            self.channels.resize(idx + 1, Vec::new());
        }
        self.channels[idx] = data;
    }

    /// The length of the longest channel. Zero if every channel is empty.
    pub fn max_len(&self) -> usize {
        self.channels.iter().map(|c| c.len()).max().unwrap_or(0)
    }

    /// Pads every non-empty channel shorter than `max_len()` to that length
    /// with zeros, as C2 does on every acquisition tick before fan-out.
    pub fn pad_to_max_len(&mut self) {
        let max_len = self.max_len();
        for chan in self.channels.iter_mut() {
            if !chan.is_empty() && chan.len() < max_len {
                chan.resize(max_len, 0);
            }
        }
    }
}

/// Same shape as [`RawFrame`] but floating point, produced after bipolar
/// re-referencing.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleFrame {
    pub sampling_rate: u32,
    channels: Vec<Vec<f64>>,
}

impl DoubleFrame {
    pub fn new(sampling_rate: u32, channel_count: usize) -> Self {
        Self {
            sampling_rate,
            channels: vec![Vec::new(); channel_count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, idx: usize) -> Option<&[f64]> {
        self.channels.get(idx).map(|v| v.as_slice())
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn set_channel(&mut self, idx: usize, data: Vec<f64>) {
        if idx >= self.channels.len() {
            self.channels.resize(idx + 1, Vec::new());
        }
        self.channels[idx] = data;
    }
}

/// A bipolar re-reference pair: `channel[pos] - channel[neg]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BipolarPair {
    pub pos: u8,
    pub neg: u8,
}

impl BipolarPair {
    pub fn new(pos: u8, neg: u8) -> Result<Self, ElememError> {
        if pos == neg {
            return Err(ElememError::bounds(format!(
                "bipolar pair has identical electrodes: {pos}"
            )));
        }
        Ok(Self { pos, neg })
    }
}

/// 3-D spectral power array indexed `[frequency, channel, time]`, carrying
/// its own sampling rate (the rate of the time axis after any binning).
#[derive(Debug, Clone, PartialEq)]
pub struct Powers {
    pub sampling_rate: u32,
    n_freq: usize,
    n_chan: usize,
    n_time: usize,
    data: Vec<f64>,
}

impl Powers {
    pub fn zeros(sampling_rate: u32, n_freq: usize, n_chan: usize, n_time: usize) -> Self {
        Self {
            sampling_rate,
            n_freq,
            n_chan,
            n_time,
            data: vec![0.0; n_freq * n_chan * n_time],
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.n_freq, self.n_chan, self.n_time)
    }

    #[inline]
    fn index(&self, freq: usize, chan: usize, time: usize) -> usize {
        (freq * self.n_chan + chan) * self.n_time + time
    }

    #[inline]
    pub fn get(&self, freq: usize, chan: usize, time: usize) -> f64 {
        self.data[self.index(freq, chan, time)]
    }

    #[inline]
    pub fn set(&mut self, freq: usize, chan: usize, time: usize, value: f64) {
        let idx = self.index(freq, chan, time);
        self.data[idx] = value;
    }

    /// Zero every time-sample of one channel, across all frequencies.
    pub fn zero_channel(&mut self, chan: usize) {
        for f in 0..self.n_freq {
            for t in 0..self.n_time {
                self.set(f, chan, t, 0.0);
            }
        }
    }

    pub fn channel_slice(&self, freq: usize, chan: usize) -> &[f64] {
        let start = self.index(freq, chan, 0);
        &self.data[start..start + self.n_time]
    }

    /// Applies `f` to every cell in place.
    pub fn map_in_place(&mut self, mut f: impl FnMut(f64) -> f64) {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
    }
}

/// One electrode-pair stimulation channel with its pulse parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimChannel {
    pub electrode_pos: u8,
    pub electrode_neg: u8,
    pub amplitude_ua: u16,
    pub frequency_hz: u32,
    pub duration_us: u32,
    pub area_mm2: f32,
    #[serde(default = "default_burst_frac")]
    pub burst_frac: f32,
    #[serde(default)]
    pub burst_slow_freq_hz: u32,
}

fn default_burst_frac() -> f32 {
    1.0
}

impl StimChannel {
    /// Pulse count per spec §4.8 / GLOSSARY: `(duration_us * frequency_Hz) / 1e6`.
    pub fn pulse_count(&self) -> f64 {
        (self.duration_us as f64 * self.frequency_hz as f64) / 1e6
    }
}

/// An ordered sequence of up to 63 [`StimChannel`]s with mutually disjoint
/// electrodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StimProfile {
    channels: Vec<StimChannel>,
}

impl StimProfile {
    pub const MAX_PAIRS: usize = 63;
    pub const MAX_UNIQUE_TRIPLES: usize = 7;

    pub fn new(channels: Vec<StimChannel>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[StimChannel] {
        &self.channels
    }

    pub fn max_duration_us(&self) -> u32 {
        self.channels.iter().map(|c| c.duration_us).max().unwrap_or(0)
    }
}

/// What kind of event window C9 is requesting from C7/C4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationType {
    Stim,
    Sham,
    Normalize,
    Nostim,
}

/// Parameters for one arming of the Task Classifier Manager (C7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskClassifierSettings {
    pub cl_type: ClassificationType,
    pub duration_ms: u64,
    pub classif_id: u64,
    pub binned_sampling_rate: u32,
}
