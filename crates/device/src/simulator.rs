//! Deterministic synthetic acquisition source.
//!
//! Each channel `i` produces a sinusoid at `2 + 4*i` Hz (same convention as
//! the mock EEG driver this is grounded on), scaled to the `i16` sample
//! range. Samples are generated from an internal counter rather than the
//! wall clock so output is reproducible in tests.

use async_trait::async_trait;
use elemem_types::{ElememError, RawFrame, Sample};
use std::f64::consts::PI;

use crate::traits::AcquisitionSource;

const AMPLITUDE: f64 = 2000.0;

/// A deterministic synthetic acquisition source.
pub struct SimulatedAcquisitionSource {
    channel_count: usize,
    rate: u32,
    samples_emitted: u64,
    /// Samples to hand back per `get_data()` call once armed.
    batch_size: usize,
    initialized: bool,
    fail_after: Option<u64>,
}

impl SimulatedAcquisitionSource {
    /// `batch_size` is the number of samples per channel returned by each
    /// `get_data()` call, analogous to one acquisition-hub poll tick's worth
    /// of data.
    pub fn new(channel_count: usize, batch_size: usize) -> Self {
        Self {
            channel_count,
            rate: 0,
            samples_emitted: 0,
            batch_size,
            initialized: false,
            fail_after: None,
        }
    }

    /// Makes the simulator return a device error after `n` total calls to
    /// `get_data`, for exercising C2's failure semantics in tests.
    pub fn fail_after_calls(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    fn sample_at(&self, channel: usize, sample_index: u64) -> Sample {
        let t_secs = sample_index as f64 / self.rate.max(1) as f64;
        let freq = 2.0 + (channel as f64) * 4.0;
        let value = (2.0 * PI * freq * t_secs).sin() * AMPLITUDE;
        value.clamp(i16::MIN as f64, i16::MAX as f64) as Sample
    }
}

#[async_trait]
impl AcquisitionSource for SimulatedAcquisitionSource {
    async fn initialize_channels(&mut self, rate: u32) -> Result<(), ElememError> {
        if rate == 0 {
            return Err(ElememError::bounds("acquisition rate must be positive"));
        }
        self.rate = rate;
        self.samples_emitted = 0;
        self.initialized = true;
        Ok(())
    }

    async fn get_data(&mut self) -> Result<RawFrame, ElememError> {
        if !self.initialized {
            return Err(ElememError::device("source not initialized"));
        }
        if let Some(limit) = self.fail_after {
            if self.samples_emitted / self.batch_size.max(1) as u64 >= limit {
                return Err(ElememError::device("simulated device lost"));
            }
        }

        let mut frame = RawFrame::new(self.rate, self.channel_count);
        for c in 0..self.channel_count {
            let data = (0..self.batch_size)
                .map(|i| self.sample_at(c, self.samples_emitted + i as u64))
                .collect();
            frame.set_channel(c, data);
        }
        self.samples_emitted += self.batch_size as u64;
        Ok(frame)
    }

    async fn close(&mut self) -> Result<(), ElememError> {
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_deterministic_batches() {
        let mut src = SimulatedAcquisitionSource::new(2, 10);
        src.initialize_channels(1000).await.unwrap();
        let a = src.get_data().await.unwrap();
        assert_eq!(a.channel(0).unwrap().len(), 10);
        assert_eq!(a.channel(1).unwrap().len(), 10);

        let mut src2 = SimulatedAcquisitionSource::new(2, 10);
        src2.initialize_channels(1000).await.unwrap();
        let b = src2.get_data().await.unwrap();
        assert_eq!(a, b, "same configuration must produce identical output");
    }

    #[tokio::test]
    async fn rejects_use_before_init() {
        let mut src = SimulatedAcquisitionSource::new(1, 10);
        assert!(src.get_data().await.is_err());
    }

    #[tokio::test]
    async fn reports_device_loss_and_stops() {
        let mut src = SimulatedAcquisitionSource::new(1, 10).fail_after_calls(2);
        src.initialize_channels(1000).await.unwrap();
        assert!(src.get_data().await.is_ok());
        assert!(src.get_data().await.is_ok());
        assert!(src.get_data().await.is_err());
    }
}
