pub mod acquisition_hub;
pub mod bayesian;
pub mod cps;
pub mod event_log;
pub mod stim_worker;
pub mod task_classifier_manager;

pub use acquisition_hub::AcquisitionHubHandle;
pub use bayesian::{BayesianSearch, BoundedRandomSearch};
pub use cps::{CpsConfig, CpsHandle, StimTemplate};
pub use event_log::EventLogHandle;
pub use stim_worker::StimWorkerHandle;
pub use task_classifier_manager::{ClassifierOutcome, TaskClassifierManagerHandle};
