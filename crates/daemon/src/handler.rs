//! Constructs and wires C2-C9 into one running session, and owns the
//! session lifecycle (start/restart/pause/stop), grounded on `Handler.h`'s
//! role as the owner of `eeg_acq` and `stim_worker` (spec §4.10/§9).

use elemem_config::{label_and_area_maps, resolve_stim_profile, ExperimentConfig, MontageEntry};
use elemem_device::{SimulatedAcquisitionSource, SimulatedStimulator};
use elemem_dsp::{LogisticRegressionClassifier, PipelineSettings};
use elemem_types::{BipolarPair, ElememError};
use elemem_workers::{
    AcquisitionHubHandle, BoundedRandomSearch, CpsConfig, CpsHandle, EventLogHandle, StimTemplate, StimWorkerHandle,
    TaskClassifierManagerHandle,
};
use tokio::sync::mpsc;

pub struct HandlerConfig {
    pub sampling_rate: u32,
    pub channel_count: usize,
    pub window_capacity: usize,
    pub bipolar_pairs: Vec<BipolarPair>,
    pub pipeline_settings: PipelineSettings,
    pub event_log_path: String,
    pub cps_config: CpsConfig,
}

/// Session root: owns every worker handle and the CPS controller driving
/// them. Dropping it drops all handles, which tears down the tasks.
pub struct Handler {
    pub acquisition_hub: AcquisitionHubHandle,
    pub task_classifier_manager: TaskClassifierManagerHandle,
    pub stim_worker: StimWorkerHandle,
    pub event_log: EventLogHandle,
    pub cps: CpsHandle,
}

impl Handler {
    /// Builds the session from an experiment config, using simulated
    /// acquisition/stim devices (no real hardware SDK is in scope).
    pub async fn from_experiment_config(
        config: &ExperimentConfig,
        montage: &[MontageEntry],
        bipolar_pairs: Vec<BipolarPair>,
        sampling_rate: u32,
        channel_count: usize,
        window_capacity: usize,
        event_log_path: &str,
    ) -> Result<Self, ElememError> {
        let (label_to_channel, channel_area) = label_and_area_maps(montage);
        let stim_profile = resolve_stim_profile(config, &label_to_channel, &channel_area)?;
        let first_channel = stim_profile
            .channels()
            .first()
            .copied()
            .ok_or_else(|| ElememError::file_format("experiment config has no stim_channels"))?;

        let template = StimTemplate {
            electrode_pos: first_channel.electrode_pos,
            electrode_neg: first_channel.electrode_neg,
            frequency_hz: first_channel.frequency_hz,
            duration_us: first_channel.duration_us,
            area_mm2: first_channel.area_mm2,
            amplitude_bounds_ma: (
                config.stim_channels[0].amplitude_range_ma[0],
                config.stim_channels[0].amplitude_range_ma[1],
            ),
        };

        let cps_config = CpsConfig {
            sham_duration_ms: config.experiment_specs.sham_duration_ms,
            intertrial_range_ms: (
                config.experiment_specs.intertrial_range_ms[0],
                config.experiment_specs.intertrial_range_ms[1],
            ),
            ..CpsConfig::default()
        };

        let handler_config = HandlerConfig {
            sampling_rate,
            channel_count,
            window_capacity,
            bipolar_pairs,
            pipeline_settings: PipelineSettings::default(),
            event_log_path: event_log_path.to_string(),
            cps_config,
        };

        Ok(Self::build(handler_config, template).await)
    }

    async fn build(config: HandlerConfig, template: StimTemplate) -> Self {
        let event_log = EventLogHandle::spawn();
        let _ = event_log.open(config.event_log_path.clone()).await;

        let acquisition_hub = AcquisitionHubHandle::spawn(elemem_workers::acquisition_hub::DEFAULT_POLLING_INTERVAL_MS);
        acquisition_hub.set_source(Box::new(SimulatedAcquisitionSource::new(config.channel_count, 32)));

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let classifier = Box::new(LogisticRegressionClassifier::new(
            vec![0.0; config.pipeline_settings.frequencies_hz.len() * config.bipolar_pairs.len()],
            0.0,
        ));
        let task_classifier_manager = TaskClassifierManagerHandle::spawn(
            config.sampling_rate,
            config.window_capacity,
            config.bipolar_pairs,
            config.pipeline_settings,
            classifier,
            outcome_tx,
        );

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel();
        acquisition_hub.register_callback("task_classifier_manager", frame_tx);
        let tcm_for_bridge = task_classifier_manager.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                tcm_for_bridge.deliver(frame);
            }
        });

        let stim_worker = StimWorkerHandle::spawn(Box::new(SimulatedStimulator::new()), event_log.clone(), || 0);

        let search = Box::new(BoundedRandomSearch::new(vec![template.amplitude_bounds_ma], 0));
        let cps = CpsHandle::spawn(
            config.cps_config,
            template,
            search,
            task_classifier_manager.clone(),
            stim_worker.clone(),
            event_log.clone(),
            outcome_rx,
        );

        Self {
            acquisition_hub,
            task_classifier_manager,
            stim_worker,
            event_log,
            cps,
        }
    }

    pub async fn start(&self) -> Result<(), ElememError> {
        self.acquisition_hub.initialize_channels(1000).await?;
        self.cps.start().await
    }

    pub async fn restart(&self) -> Result<(), ElememError> {
        self.cps.restart().await
    }

    pub async fn pause(&self) -> Result<(), ElememError> {
        self.cps.pause().await
    }

    pub async fn stop(&self) -> Result<(), ElememError> {
        self.cps.stop().await?;
        self.acquisition_hub.close_source().await?;
        self.stim_worker.close().await?;
        self.event_log.close().await
    }
}
