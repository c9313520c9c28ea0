//! Experiment config, montage, and bipolar-pair CSV loading (spec §6).

pub mod experiment;
pub mod montage;

pub use experiment::{resolve_stim_channel, resolve_stim_profile, ExperimentConfig, ExperimentSpecs, StimChannelSpec};
pub use montage::{label_and_area_maps, load_bipolar_pairs, load_montage, MontageEntry};
