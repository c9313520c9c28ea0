//! Experiment config JSON (spec §6 "Config (JSON)").

use std::collections::HashMap;

use elemem_types::{ElememError, StimChannel, StimProfile};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ElectrodeSpec {
    Label(String),
    Indices([u8; 2]),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StimChannelSpec {
    pub electrodes: ElectrodeSpec,
    pub amplitude_range_ma: [f64; 2],
    pub frequency_range_hz: [f64; 2],
    pub duration_range_ms: [f64; 2],
    pub amplitude_ma: Option<f64>,
    pub frequency_hz: Option<f64>,
    pub duration_ms: Option<f64>,
    pub burst_fraction: Option<f32>,
    pub burst_slow_freq_hz: Option<u32>,
    pub stimtag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentSpecs {
    pub num_stim_trials: u32,
    pub num_sham_trials: u32,
    pub intertrial_range_ms: [u64; 2],
    pub sham_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    pub electrode_config_file: String,
    pub bipolar_electrode_config_file: Option<String>,
    pub stim_channels: Vec<StimChannelSpec>,
    pub experiment_specs: ExperimentSpecs,
}

impl ExperimentConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ElememError> {
        serde_json::from_str(s).map_err(|e| ElememError::file_format(format!("malformed experiment config: {e}")))
    }

    pub fn load(path: &str) -> Result<Self, ElememError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ElememError::file_format(format!("cannot read experiment config {path}: {e}")))?;
        Self::from_json_str(&contents)
    }
}

/// Resolves one [`StimChannelSpec`] into a concrete [`StimChannel`],
/// applying the defaults in spec §6 (amplitude->min, frequency->max,
/// duration->min), resolving label electrodes via `label_to_channel`, and
/// the channel's `area_mm2` as the smaller of the pos/neg montage areas
/// (`Settings.cpp`'s "min of the pairs" rule).
pub fn resolve_stim_channel(
    spec: &StimChannelSpec,
    label_to_channel: &HashMap<String, u8>,
    channel_area: &HashMap<u8, f32>,
) -> Result<StimChannel, ElememError> {
    let (electrode_pos, electrode_neg) = match &spec.electrodes {
        ElectrodeSpec::Indices([pos, neg]) => (*pos, *neg),
        ElectrodeSpec::Label(label) => {
            let (pos_label, neg_label) = label
                .split_once('_')
                .ok_or_else(|| ElememError::file_format(format!("malformed electrode label '{label}', expected 'A_B'")))?;
            let pos = *label_to_channel
                .get(pos_label)
                .ok_or_else(|| ElememError::file_format(format!("unknown electrode label '{pos_label}'")))?;
            let neg = *label_to_channel
                .get(neg_label)
                .ok_or_else(|| ElememError::file_format(format!("unknown electrode label '{neg_label}'")))?;
            (pos, neg)
        }
    };

    let amplitude_ma = spec.amplitude_ma.unwrap_or(spec.amplitude_range_ma[0]);
    let frequency_hz = spec.frequency_hz.unwrap_or(spec.frequency_range_hz[1]);
    let duration_ms = spec.duration_ms.unwrap_or(spec.duration_range_ms[0]);

    let pos_area = *channel_area
        .get(&electrode_pos)
        .ok_or_else(|| ElememError::file_format(format!("no montage area for electrode {electrode_pos}")))?;
    let neg_area = *channel_area
        .get(&electrode_neg)
        .ok_or_else(|| ElememError::file_format(format!("no montage area for electrode {electrode_neg}")))?;

    Ok(StimChannel {
        electrode_pos,
        electrode_neg,
        amplitude_ua: (amplitude_ma * 1000.0).round() as u16,
        frequency_hz: frequency_hz.round() as u32,
        duration_us: (duration_ms * 1000.0).round() as u32,
        area_mm2: pos_area.min(neg_area),
        burst_frac: spec.burst_fraction.unwrap_or(1.0),
        burst_slow_freq_hz: spec.burst_slow_freq_hz.unwrap_or(0),
    })
}

pub fn resolve_stim_profile(
    config: &ExperimentConfig,
    label_to_channel: &HashMap<String, u8>,
    channel_area: &HashMap<u8, f32>,
) -> Result<StimProfile, ElememError> {
    let channels = config
        .stim_channels
        .iter()
        .map(|spec| resolve_stim_channel(spec, label_to_channel, channel_area))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StimProfile::new(channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "electrode_config_file": "montage.csv",
        "bipolar_electrode_config_file": "bipolar.csv",
        "stim_channels": [
            {
                "electrodes": "LA1_LA2",
                "amplitude_range_ma": [0.5, 2.0],
                "frequency_range_hz": [50, 200],
                "duration_range_ms": [100, 500]
            }
        ],
        "experiment_specs": {
            "num_stim_trials": 10,
            "num_sham_trials": 2,
            "intertrial_range_ms": [1000, 3000],
            "sham_duration_ms": 500
        }
    }
    "#;

    #[test]
    fn parses_experiment_config() {
        let config = ExperimentConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.stim_channels.len(), 1);
        assert_eq!(config.experiment_specs.num_stim_trials, 10);
    }

    #[test]
    fn resolves_defaults_to_amplitude_min_frequency_max_duration_min() {
        let config = ExperimentConfig::from_json_str(SAMPLE).unwrap();
        let mut labels = HashMap::new();
        labels.insert("LA1".to_string(), 0u8);
        labels.insert("LA2".to_string(), 1u8);
        let mut areas = HashMap::new();
        areas.insert(0u8, 0.5f32);
        areas.insert(1u8, 0.25f32);
        let channel = resolve_stim_channel(&config.stim_channels[0], &labels, &areas).unwrap();
        assert_eq!(channel.electrode_pos, 0);
        assert_eq!(channel.electrode_neg, 1);
        assert_eq!(channel.amplitude_ua, 500);
        assert_eq!(channel.frequency_hz, 200);
        assert_eq!(channel.duration_us, 100_000);
        assert_eq!(channel.area_mm2, 0.25);
    }

    #[test]
    fn resolves_area_as_min_of_pos_and_neg_montage_areas() {
        let config = ExperimentConfig::from_json_str(SAMPLE).unwrap();
        let mut labels = HashMap::new();
        labels.insert("LA1".to_string(), 0u8);
        labels.insert("LA2".to_string(), 1u8);
        let mut areas = HashMap::new();
        areas.insert(0u8, 0.1f32);
        areas.insert(1u8, 0.9f32);
        let channel = resolve_stim_channel(&config.stim_channels[0], &labels, &areas).unwrap();
        assert_eq!(channel.area_mm2, 0.1);
    }

    #[test]
    fn rejects_unknown_electrode_label() {
        let config = ExperimentConfig::from_json_str(SAMPLE).unwrap();
        let labels = HashMap::new();
        let areas = HashMap::new();
        let err = resolve_stim_channel(&config.stim_channels[0], &labels, &areas).unwrap_err();
        assert!(matches!(err, ElememError::FileFormat(_)));
    }

    #[test]
    fn rejects_electrode_missing_from_montage_area_table() {
        let config = ExperimentConfig::from_json_str(SAMPLE).unwrap();
        let mut labels = HashMap::new();
        labels.insert("LA1".to_string(), 0u8);
        labels.insert("LA2".to_string(), 1u8);
        let areas = HashMap::new();
        let err = resolve_stim_channel(&config.stim_channels[0], &labels, &areas).unwrap_err();
        assert!(matches!(err, ElememError::FileFormat(_)));
    }
}
