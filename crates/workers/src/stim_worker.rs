//! Stim Worker (C8): validates and fires a stimulation profile (spec §4.8),
//! grounded on `StimWorker.cpp`.

use elemem_device::Stimulator;
use elemem_types::{event::kind, ElememError, EventRecord, StimProfile};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::event_log::EventLogHandle;

enum Command {
    ConfigureStimulation(StimProfile, oneshot::Sender<Result<(), ElememError>>),
    Stimulate(oneshot::Sender<Result<(), ElememError>>),
    Stop(oneshot::Sender<Result<(), ElememError>>),
    Close(oneshot::Sender<Result<(), ElememError>>),
}

#[derive(Clone)]
pub struct StimWorkerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl StimWorkerHandle {
    pub fn spawn(stimulator: Box<dyn Stimulator>, event_log: EventLogHandle, session_clock_ms: fn() -> u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, stimulator, event_log, session_clock_ms));
        Self { tx }
    }

    pub async fn configure_stimulation(&self, profile: StimProfile) -> Result<(), ElememError> {
        self.call(|reply| Command::ConfigureStimulation(profile, reply)).await
    }

    pub async fn stimulate(&self) -> Result<(), ElememError> {
        self.call(Command::Stimulate).await
    }

    pub async fn stop(&self) -> Result<(), ElememError> {
        self.call(Command::Stop).await
    }

    pub async fn close(&self) -> Result<(), ElememError> {
        self.call(Command::Close).await
    }

    async fn call(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), ElememError>>) -> Command,
    ) -> Result<(), ElememError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .map_err(|_| ElememError::fatal("stim worker is gone"))?;
        reply_rx.await.map_err(|_| ElememError::fatal("stim worker dropped reply"))?
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut stimulator: Box<dyn Stimulator>,
    event_log: EventLogHandle,
    session_clock_ms: fn() -> u64,
) {
    let mut cur_profile: Option<StimProfile> = None;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::ConfigureStimulation(profile, reply) => {
                let result = stimulator.configure_stimulation(profile.clone()).await;
                if result.is_ok() {
                    cur_profile = Some(profile);
                }
                let _ = reply.send(result);
            }
            Command::Stimulate(reply) => {
                let result = stimulator.stimulate().await;
                if result.is_ok() {
                    if let Some(profile) = &cur_profile {
                        let now = session_clock_ms();
                        for ch in profile.channels() {
                            let record = EventRecord::new(now, kind::STIMMING).with_data(json!({
                                "electrode_pos": ch.electrode_pos,
                                "electrode_neg": ch.electrode_neg,
                                "amplitude": ch.amplitude_ua as f64 * 1e-3,
                                "frequency": ch.frequency_hz,
                                "duration": ch.duration_us as f64 * 1e-3,
                            }));
                            event_log.log(record);
                        }
                    }
                }
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let _ = reply.send(stimulator.stop().await);
            }
            Command::Close(reply) => {
                let _ = reply.send(stimulator.close().await);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elemem_device::SimulatedStimulator;
    use elemem_types::StimChannel;

    fn clock_zero() -> u64 {
        0
    }

    #[tokio::test]
    async fn configures_and_stimulates() {
        let event_log = EventLogHandle::spawn();
        let worker = StimWorkerHandle::spawn(Box::new(SimulatedStimulator::new()), event_log, clock_zero);
        let profile = StimProfile::new(vec![StimChannel {
            electrode_pos: 1,
            electrode_neg: 2,
            amplitude_ua: 1000,
            frequency_hz: 50,
            duration_us: 1_000_000,
            area_mm2: 1.0,
            burst_frac: 1.0,
            burst_slow_freq_hz: 0,
        }]);
        worker.configure_stimulation(profile).await.unwrap();
        worker.stimulate().await.unwrap();
    }
}
