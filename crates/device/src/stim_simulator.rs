//! A stimulator simulator that enforces the device limits from spec §4.1/§4.8
//! without touching real hardware, grounded on `StimWorker.cpp`'s
//! `ConfigureStimulation_Handler`/`Stimulate_Handler` pair.

use async_trait::async_trait;
use elemem_types::{ElememError, StimProfile};
use std::collections::HashSet;

use crate::traits::{MaxStimValues, Stimulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Triple {
    frequency_hz: u32,
    duration_us: u32,
    amplitude_ua: u16,
}

/// An in-memory stimulator standing in for the real CereStim-class device.
pub struct SimulatedStimulator {
    max: Option<MaxStimValues>,
    profile: Option<StimProfile>,
    configured: bool,
    /// profiles fired since construction, for test assertions.
    pub fired_count: u32,
}

impl SimulatedStimulator {
    pub fn new() -> Self {
        Self {
            max: None,
            profile: None,
            configured: false,
            fired_count: 0,
        }
    }

    fn validate(profile: &StimProfile, max: Option<MaxStimValues>) -> Result<(), ElememError> {
        let channels = profile.channels();
        if channels.is_empty() {
            return Err(ElememError::protocol("stimulation profile has no channels"));
        }
        if channels.len() > StimProfile::MAX_PAIRS {
            return Err(ElememError::bounds(format!(
                "stimulation profile has {} pairs, max is {}",
                channels.len(),
                StimProfile::MAX_PAIRS
            )));
        }

        let mut electrodes = HashSet::new();
        let mut triples = HashSet::new();
        for ch in channels {
            if !electrodes.insert(ch.electrode_pos) || !electrodes.insert(ch.electrode_neg) {
                return Err(ElememError::bounds(format!(
                    "electrode {} used in more than one stimulation channel",
                    ch.electrode_pos
                )));
            }
            triples.insert(Triple {
                frequency_hz: ch.frequency_hz,
                duration_us: ch.duration_us,
                amplitude_ua: ch.amplitude_ua,
            });

            let pulses = ch.pulse_count();
            if !(1.0..=255.0).contains(&pulses) {
                return Err(ElememError::bounds(format!(
                    "pulse count {pulses} out of range [1,255] for electrode {}",
                    ch.electrode_pos
                )));
            }

            if let Some(max) = max {
                if ch.amplitude_ua > max.amplitude_ua || ch.frequency_hz > max.frequency_hz {
                    return Err(ElememError::bounds(format!(
                        "channel on electrode {} exceeds configured max stim values",
                        ch.electrode_pos
                    )));
                }
            }
        }

        if triples.len() > StimProfile::MAX_UNIQUE_TRIPLES {
            return Err(ElememError::bounds(format!(
                "stimulation profile has {} unique (frequency, duration, amplitude) triples, max is {}",
                triples.len(),
                StimProfile::MAX_UNIQUE_TRIPLES
            )));
        }
        Ok(())
    }
}

impl Default for SimulatedStimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stimulator for SimulatedStimulator {
    async fn set_max_values(&mut self, max: MaxStimValues) -> Result<(), ElememError> {
        self.max = Some(max);
        Ok(())
    }

    async fn configure_stimulation(&mut self, profile: StimProfile) -> Result<(), ElememError> {
        Self::validate(&profile, self.max)?;
        self.profile = Some(profile);
        self.configured = true;
        Ok(())
    }

    async fn stimulate(&mut self) -> Result<(), ElememError> {
        if !self.configured {
            return Err(ElememError::protocol("stimulate called before configure_stimulation"));
        }
        self.fired_count += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ElememError> {
        self.configured = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ElememError> {
        self.profile = None;
        self.configured = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elemem_types::StimChannel;

    fn channel(pos: u8, neg: u8, freq: u32, dur_us: u32, amp: u16) -> StimChannel {
        StimChannel {
            electrode_pos: pos,
            electrode_neg: neg,
            amplitude_ua: amp,
            frequency_hz: freq,
            duration_us: dur_us,
            area_mm2: 1.0,
            burst_frac: 1.0,
            burst_slow_freq_hz: 0,
        }
    }

    #[tokio::test]
    async fn accepts_valid_profile_and_fires() {
        let mut stim = SimulatedStimulator::new();
        let profile = StimProfile::new(vec![channel(1, 2, 100, 10_000, 500)]);
        stim.configure_stimulation(profile).await.unwrap();
        stim.stimulate().await.unwrap();
        assert_eq!(stim.fired_count, 1);
    }

    #[tokio::test]
    async fn rejects_too_many_pairs() {
        let mut stim = SimulatedStimulator::new();
        let channels: Vec<_> = (0..64u8)
            .map(|i| channel(i.wrapping_mul(2), i.wrapping_mul(2).wrapping_add(1), 100, 500, 500))
            .collect();
        let profile = StimProfile::new(channels);
        assert!(stim.configure_stimulation(profile).await.is_err());
    }

    #[tokio::test]
    async fn rejects_too_many_unique_triples() {
        let mut stim = SimulatedStimulator::new();
        let channels: Vec<_> = (0..8u8)
            .map(|i| channel(i * 2, i * 2 + 1, 100 + i as u32, 500, 500))
            .collect();
        let profile = StimProfile::new(channels);
        assert!(stim.configure_stimulation(profile).await.is_err());
    }

    #[tokio::test]
    async fn rejects_pulse_count_out_of_range() {
        let mut stim = SimulatedStimulator::new();
        let profile = StimProfile::new(vec![channel(1, 2, 1, 100, 500)]);
        assert!(stim.configure_stimulation(profile).await.is_err());
    }

    #[tokio::test]
    async fn rejects_reused_electrode() {
        let mut stim = SimulatedStimulator::new();
        let profile = StimProfile::new(vec![channel(1, 2, 100, 500, 500), channel(1, 3, 100, 500, 500)]);
        assert!(stim.configure_stimulation(profile).await.is_err());
    }

    #[tokio::test]
    async fn stimulate_without_configure_is_protocol_error() {
        let mut stim = SimulatedStimulator::new();
        assert!(matches!(stim.stimulate().await, Err(ElememError::Protocol(_))));
    }
}
