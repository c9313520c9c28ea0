//! CPS Experiment Controller (C9): the closed-loop trial state machine
//! (spec §4.9), grounded on `ExperCPS.h`/`ExperCPS.cpp`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use elemem_types::{event::kind, ClassificationType, ElememError, EventRecord, StimChannel, StimProfile};
use rand::Rng;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::bayesian::BayesianSearch;
use crate::event_log::EventLogHandle;
use crate::stim_worker::StimWorkerHandle;
use crate::task_classifier_manager::{ClassifierOutcome, TaskClassifierManagerHandle};

/// A fixed template for the single stim location under search: every field
/// is held constant except `amplitude_ua`, which the Bayesian model tunes.
#[derive(Clone, Copy)]
pub struct StimTemplate {
    pub electrode_pos: u8,
    pub electrode_neg: u8,
    pub frequency_hz: u32,
    pub duration_us: u32,
    pub area_mm2: f32,
    pub amplitude_bounds_ma: (f64, f64),
}

#[derive(Clone, Copy)]
pub struct CpsConfig {
    pub experiment_duration_ms: u64,
    pub n_normalize_events: usize,
    pub classify_ms: u64,
    pub poststim_classif_lockout_ms: u64,
    pub stim_lockout_ms: u64,
    pub normalize_lockout_ms: u64,
    pub intertrial_range_ms: (u64, u64),
    pub sham_duration_ms: u64,
}

impl Default for CpsConfig {
    fn default() -> Self {
        Self {
            experiment_duration_ms: 7200 * 1000,
            n_normalize_events: 25,
            classify_ms: 1350,
            poststim_classif_lockout_ms: 500,
            stim_lockout_ms: 2500,
            normalize_lockout_ms: 3000,
            intertrial_range_ms: (0, 0),
            sham_duration_ms: 0,
        }
    }
}

/// Maps a continuous amplitude (mA) to the device's 100 uA granularity
/// (spec §4.9 "Stim parameter mapping").
fn amplitude_to_ua(amplitude_ma: f64) -> u16 {
    ((amplitude_ma * 10.0 + 0.5).floor() as u32 * 100) as u16
}

fn profile_from(template: &StimTemplate, amplitude_ua: u16) -> StimProfile {
    StimProfile::new(vec![StimChannel {
        electrode_pos: template.electrode_pos,
        electrode_neg: template.electrode_neg,
        amplitude_ua,
        frequency_hz: template.frequency_hz,
        duration_us: template.duration_us,
        area_mm2: template.area_mm2,
        burst_frac: 1.0,
        burst_slow_freq_hz: 0,
    }])
}

enum Command {
    Start(oneshot::Sender<Result<(), ElememError>>),
    Restart(oneshot::Sender<Result<(), ElememError>>),
    Pause(oneshot::Sender<Result<(), ElememError>>),
    Stop(oneshot::Sender<Result<(), ElememError>>),
}

#[derive(Clone)]
pub struct CpsHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CpsHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: CpsConfig,
        template: StimTemplate,
        search: Box<dyn BayesianSearch>,
        tcm: TaskClassifierManagerHandle,
        stim: StimWorkerHandle,
        event_log: EventLogHandle,
        outcomes: mpsc::UnboundedReceiver<ClassifierOutcome>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(true));
        tokio::spawn(run(rx, outcomes, config, template, search, tcm, stim, event_log, stopped));
        Self { tx }
    }

    pub async fn start(&self) -> Result<(), ElememError> {
        self.call(Command::Start).await
    }

    pub async fn restart(&self) -> Result<(), ElememError> {
        self.call(Command::Restart).await
    }

    pub async fn pause(&self) -> Result<(), ElememError> {
        self.call(Command::Pause).await
    }

    pub async fn stop(&self) -> Result<(), ElememError> {
        self.call(Command::Stop).await
    }

    async fn call(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), ElememError>>) -> Command,
    ) -> Result<(), ElememError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .map_err(|_| ElememError::fatal("cps controller is gone"))?;
        reply_rx.await.map_err(|_| ElememError::fatal("cps controller dropped reply"))?
    }
}

struct ExperimentState {
    classif_id: u64,
    normalize_count: usize,
    cur_ev: usize,
    prev_sham: bool,
    last_classif_result: Option<f64>,
    cur_profile: Option<StimProfile>,
    stim_offset_ms: u64,
    /// Biomarkers from SHAM trials, kept separately from the Bayesian
    /// model's own samples so termination can compare the best stim
    /// biomarker against the sham distribution (`original_source`'s
    /// `sham_results` bookkeeping).
    sham_results: Vec<f64>,
}

impl ExperimentState {
    fn new() -> Self {
        Self {
            classif_id: 0,
            normalize_count: 0,
            cur_ev: 0,
            prev_sham: false,
            last_classif_result: None,
            cur_profile: None,
            stim_offset_ms: 0,
            sham_results: Vec::new(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut outcomes: mpsc::UnboundedReceiver<ClassifierOutcome>,
    config: CpsConfig,
    template: StimTemplate,
    mut search: Box<dyn BayesianSearch>,
    tcm: TaskClassifierManagerHandle,
    stim: StimWorkerHandle,
    event_log: EventLogHandle,
    stopped: Arc<AtomicBool>,
) {
    let mut state = ExperimentState::new();
    let mut start_instant: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    Command::Start(reply) => {
                        stopped.store(false, Ordering::SeqCst);
                        state = ExperimentState::new();
                        start_instant = Some(tokio::time::Instant::now());
                        event_log.log(EventRecord::new(0, kind::START));
                        let first_profile = next_profile(&template, search.as_mut());
                        state.cur_profile = Some(first_profile);
                        tcm.process_classifier_event(ClassificationType::Normalize, config.classify_ms, state.classif_id);
                        state.classif_id += 1;
                        let _ = reply.send(Ok(()));
                    }
                    Command::Restart(reply) => {
                        stopped.store(false, Ordering::SeqCst);
                        state = ExperimentState::new();
                        start_instant = Some(tokio::time::Instant::now());
                        event_log.log(EventRecord::new(0, kind::START));
                        tcm.process_classifier_event(ClassificationType::Normalize, config.classify_ms, state.classif_id);
                        state.classif_id += 1;
                        let _ = reply.send(Ok(()));
                    }
                    Command::Pause(reply) => {
                        stopped.store(true, Ordering::SeqCst);
                        let _ = reply.send(Ok(()));
                    }
                    Command::Stop(reply) => {
                        stopped.store(true, Ordering::SeqCst);
                        event_log.log(EventRecord::new(elapsed_ms(start_instant), kind::EXIT));
                        log_best_profile(&event_log, search.as_ref(), &state.sham_results, elapsed_ms(start_instant));
                        let _ = reply.send(Ok(()));
                    }
                }
            }
            outcome = outcomes.recv(), if !stopped.load(Ordering::SeqCst) => {
                let Some(outcome) = outcome else { break };
                handle_outcome(
                    outcome,
                    &mut state,
                    &config,
                    &template,
                    search.as_mut(),
                    &tcm,
                    &stim,
                    &event_log,
                    start_instant,
                    &stopped,
                ).await;
            }
        }
    }
}

fn elapsed_ms(start: Option<tokio::time::Instant>) -> u64 {
    start.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0)
}

fn next_profile(template: &StimTemplate, search: &mut dyn BayesianSearch) -> StimProfile {
    let params = search.get_next_sample();
    let amplitude_ma = params.first().copied().unwrap_or(template.amplitude_bounds_ma.0);
    profile_from(template, amplitude_to_ua(amplitude_ma))
}

fn log_best_profile(event_log: &EventLogHandle, search: &dyn BayesianSearch, sham_results: &[f64], now_ms: u64) {
    let best = search.best();
    event_log.log(EventRecord::new(now_ms, "BEST_STIM_PROFILE").with_data(json!({
        "amplitude_ma": best,
        "sham_mean_biomarker": mean(sham_results),
        "sham_count": sham_results.len(),
    })));
}

/// Cooperative sleep until `target_ms` from experiment start, broken into
/// <=50ms increments so a Pause/Stop can interrupt it promptly (spec §5).
async fn wait_until(target_ms: u64, start: Option<tokio::time::Instant>, stopped: &AtomicBool) {
    loop {
        let now_ms = elapsed_ms(start);
        if now_ms >= target_ms || stopped.load(Ordering::SeqCst) {
            return;
        }
        let remaining = target_ms - now_ms;
        tokio::time::sleep(Duration::from_millis(remaining.min(50))).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_outcome(
    outcome: ClassifierOutcome,
    state: &mut ExperimentState,
    config: &CpsConfig,
    template: &StimTemplate,
    search: &mut dyn BayesianSearch,
    tcm: &TaskClassifierManagerHandle,
    stim: &StimWorkerHandle,
    event_log: &EventLogHandle,
    start: Option<tokio::time::Instant>,
    stopped: &AtomicBool,
) {
    match outcome {
        ClassifierOutcome::BaselineUpdated { .. } => {
            state.normalize_count += 1;
            let now_ms = elapsed_ms(start);
            event_log.log(EventRecord::new(now_ms, "NORMALIZE_PROGRESS").with_data(json!({
                "count": state.normalize_count,
                "n_normalize_events": config.n_normalize_events,
            })));
            let target = now_ms + config.normalize_lockout_ms;
            if maybe_terminate(target, config, event_log, search, &state.sham_results, stopped) {
                return;
            }
            wait_until(target, start, stopped).await;
            if state.normalize_count < config.n_normalize_events {
                tcm.process_classifier_event(ClassificationType::Normalize, config.classify_ms, state.classif_id);
            } else {
                if let Some(profile) = state.cur_profile.clone() {
                    let _ = stim.configure_stimulation(profile).await;
                }
                tcm.process_classifier_event(ClassificationType::Stim, config.classify_ms, state.classif_id);
            }
            state.classif_id += 1;
        }
        ClassifierOutcome::Classified { result, settings } => {
            let now_ms = elapsed_ms(start);
            match settings.cl_type {
                ClassificationType::Stim | ClassificationType::Sham => {
                    let would_stim = result < 0.5;
                    let kind_str = if settings.cl_type == ClassificationType::Stim {
                        kind::STIM_DECISION
                    } else {
                        kind::SHAM_DECISION
                    };
                    event_log.log(
                        EventRecord::new(now_ms, kind_str)
                            .with_id(settings.classif_id)
                            .with_data(json!({ "result": result, "decision": would_stim })),
                    );
                    state.last_classif_result = Some(result);

                    if would_stim {
                        let duration_ms = if settings.cl_type == ClassificationType::Sham {
                            config.sham_duration_ms
                        } else {
                            state
                                .cur_profile
                                .as_ref()
                                .map(|p| p.max_duration_us() as u64 / 1000)
                                .unwrap_or(0)
                        };

                        if settings.cl_type == ClassificationType::Sham {
                            event_log.log(
                                EventRecord::new(now_ms, kind::SHAM)
                                    .with_data(json!({ "duration": config.sham_duration_ms })),
                            );
                            state.prev_sham = true;
                        } else {
                            let _ = stim.stimulate().await;
                            state.prev_sham = false;
                        }

                        state.stim_offset_ms = now_ms + duration_ms;
                        let target = state.stim_offset_ms + config.poststim_classif_lockout_ms;
                        if maybe_terminate(target, config, event_log, search, &state.sham_results, stopped) {
                            return;
                        }
                        wait_until(target, start, stopped).await;
                        tcm.process_classifier_event(ClassificationType::Nostim, config.classify_ms, state.classif_id);
                    } else {
                        tcm.process_classifier_event(settings.cl_type, config.classify_ms, state.classif_id);
                    }
                    state.classif_id += 1;
                }
                ClassificationType::Nostim => {
                    let biomarker = result - state.last_classif_result.unwrap_or(result);

                    if state.prev_sham {
                        state.sham_results.push(biomarker);
                    } else {
                        if let Some(profile) = &state.cur_profile {
                            let amplitude_ma = profile.channels().first().map(|c| c.amplitude_ua as f64 / 1000.0).unwrap_or(0.0);
                            search.add_sample(&[amplitude_ma], biomarker);
                        }
                        let next = next_profile(template, search);
                        state.cur_profile = Some(next.clone());
                        let _ = stim.configure_stimulation(next).await;
                    }

                    let intertrial_ms = jittered_intertrial_ms(config.intertrial_range_ms);
                    let target = state.stim_offset_ms + config.stim_lockout_ms + intertrial_ms;
                    if maybe_terminate(target, config, event_log, search, &state.sham_results, stopped) {
                        return;
                    }
                    wait_until(target, start, stopped).await;

                    state.cur_ev += 1;
                    let next_type = if state.cur_ev.is_multiple_of(5) {
                        ClassificationType::Sham
                    } else {
                        ClassificationType::Stim
                    };
                    tcm.process_classifier_event(next_type, config.classify_ms, state.classif_id);
                    state.classif_id += 1;
                }
                ClassificationType::Normalize => {
                    warn!("received a Classified outcome for a Normalize trigger, ignoring");
                }
            }
        }
    }
}

fn maybe_terminate(
    next_event_time_ms: u64,
    config: &CpsConfig,
    event_log: &EventLogHandle,
    search: &dyn BayesianSearch,
    sham_results: &[f64],
    stopped: &AtomicBool,
) -> bool {
    if next_event_time_ms > config.experiment_duration_ms {
        stopped.store(true, Ordering::SeqCst);
        event_log.log(EventRecord::new(next_event_time_ms, kind::EXIT));
        log_best_profile(event_log, search, sham_results, next_event_time_ms);
        info!("experiment duration exceeded, stopping");
        true
    } else {
        false
    }
}

/// Picks a jittered inter-trial interval within the configured range.
pub fn jittered_intertrial_ms(range: (u64, u64)) -> u64 {
    if range.1 <= range.0 {
        return range.0;
    }
    rand::thread_rng().gen_range(range.0..=range.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S7: a STIM event with `duration_ms=500` and `stim_lockout_ms=2500`
    /// must not let the next pre-stim event fire before t=3000ms.
    #[tokio::test(start_paused = true)]
    async fn wait_until_enforces_stim_lockout() {
        let stopped = AtomicBool::new(false);
        let start = Some(tokio::time::Instant::now());
        let duration_ms: u64 = 500;
        let stim_lockout_ms: u64 = 2500;

        let stim_offset_ms = elapsed_ms(start) + duration_ms;
        let target = stim_offset_ms + stim_lockout_ms;
        wait_until(target, start, &stopped).await;

        assert!(elapsed_ms(start) >= 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_returns_immediately_when_stopped() {
        let stopped = AtomicBool::new(true);
        let start = Some(tokio::time::Instant::now());
        wait_until(10_000, start, &stopped).await;
        assert!(elapsed_ms(start) < 10);
    }
}
