//! Capability traits for the acquisition device and the stimulator (spec §4.1).
//!
//! Concrete hardware SDKs are out of scope; everything downstream of C2/C8
//! only ever talks to these traits, so a simulator is a drop-in replacement.

use async_trait::async_trait;
use elemem_types::{ElememError, RawFrame, StimProfile};

/// Per-site safety ceilings pushed down to the stimulator before any profile
/// is configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxStimValues {
    pub voltage: f32,
    pub amplitude_ua: u16,
    pub phase_charge_nc: f32,
    pub frequency_hz: u32,
}

/// The acquisition source capability (spec §4.1). Implementors sample a
/// device (or synthesize data) and hand back whatever is new since the last
/// call.
#[async_trait]
pub trait AcquisitionSource: Send + Sync {
    /// Arms the source for sampling at `rate` Hz. Idempotent.
    async fn initialize_channels(&mut self, rate: u32) -> Result<(), ElememError>;

    /// Returns new samples since the last call; may be a zero-length frame.
    /// A device-lost condition is a returned error; the caller stops polling.
    async fn get_data(&mut self) -> Result<RawFrame, ElememError>;

    /// Releases the device.
    async fn close(&mut self) -> Result<(), ElememError>;
}

/// The stimulator capability (spec §4.1).
#[async_trait]
pub trait Stimulator: Send + Sync {
    async fn set_max_values(&mut self, max: MaxStimValues) -> Result<(), ElememError>;

    /// Validates and programs `profile`. Rejects profiles exceeding device
    /// limits (more than [`StimProfile::MAX_UNIQUE_TRIPLES`] unique
    /// (frequency, duration, amplitude) triples, or more than
    /// [`StimProfile::MAX_PAIRS`] bipolar pairs).
    async fn configure_stimulation(&mut self, profile: StimProfile) -> Result<(), ElememError>;

    /// Fires the configured profile.
    async fn stimulate(&mut self) -> Result<(), ElememError>;

    /// Idempotent.
    async fn stop(&mut self) -> Result<(), ElememError>;

    /// Idempotent.
    async fn close(&mut self) -> Result<(), ElememError>;
}
