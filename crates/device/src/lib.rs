//! Device abstractions (C1): the acquisition-source and stimulator
//! capabilities, plus deterministic simulators that satisfy the same
//! contracts for tests and for running without real hardware attached.

pub mod simulator;
pub mod stim_simulator;
pub mod traits;

pub use simulator::SimulatedAcquisitionSource;
pub use stim_simulator::SimulatedStimulator;
pub use traits::{AcquisitionSource, MaxStimValues, Stimulator};
