//! EEG Acquisition Hub (C2): periodic pull from a source, fan-out to named
//! subscribers (spec §4.2), grounded on `EEGAcq.cpp`.

use std::sync::Arc;
use std::time::Duration;

use elemem_device::AcquisitionSource;
use elemem_types::{ElememError, RawFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 40;

enum Command {
    SetSource(Box<dyn AcquisitionSource>),
    InitializeChannels(u32, oneshot::Sender<Result<(), ElememError>>),
    RegisterCallback(String, mpsc::UnboundedSender<Arc<RawFrame>>),
    RemoveCallback(String),
    CloseSource(oneshot::Sender<Result<(), ElememError>>),
}

#[derive(Clone)]
pub struct AcquisitionHubHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl AcquisitionHubHandle {
    pub fn spawn(polling_interval_ms: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, polling_interval_ms));
        Self { tx }
    }

    pub fn set_source(&self, source: Box<dyn AcquisitionSource>) {
        let _ = self.tx.send(Command::SetSource(source));
    }

    pub async fn initialize_channels(&self, rate: u32) -> Result<(), ElememError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::InitializeChannels(rate, reply_tx))
            .map_err(|_| ElememError::fatal("acquisition hub is gone"))?;
        reply_rx.await.map_err(|_| ElememError::fatal("acquisition hub dropped reply"))?
    }

    pub fn register_callback(&self, tag: impl Into<String>, sink: mpsc::UnboundedSender<Arc<RawFrame>>) {
        let _ = self.tx.send(Command::RegisterCallback(tag.into(), sink));
    }

    pub fn remove_callback(&self, tag: impl Into<String>) {
        let _ = self.tx.send(Command::RemoveCallback(tag.into()));
    }

    pub async fn close_source(&self) -> Result<(), ElememError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::CloseSource(reply_tx))
            .map_err(|_| ElememError::fatal("acquisition hub is gone"))?;
        reply_rx.await.map_err(|_| ElememError::fatal("acquisition hub dropped reply"))?
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, polling_interval_ms: u64) {
    let mut source: Option<Box<dyn AcquisitionSource>> = None;
    let mut channels_initialized = false;
    // Preserves registration order (spec §4.2 "in registration order").
    let mut subscribers: Vec<(String, mpsc::UnboundedSender<Arc<RawFrame>>)> = Vec::new();
    let mut polling = false;

    let mut ticker = tokio::time::interval(Duration::from_millis(polling_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    Command::SetSource(new_source) => {
                        source = Some(new_source);
                    }
                    Command::InitializeChannels(rate, reply) => {
                        polling = false;
                        let result = match source.as_mut() {
                            Some(s) => s.initialize_channels(rate).await,
                            None => Ok(()),
                        };
                        if result.is_ok() {
                            channels_initialized = true;
                            polling = !subscribers.is_empty();
                        }
                        let _ = reply.send(result);
                    }
                    Command::RegisterCallback(tag, sink) => {
                        subscribers.retain(|(t, _)| t != &tag);
                        subscribers.push((tag, sink));
                        if channels_initialized {
                            polling = true;
                        }
                    }
                    Command::RemoveCallback(tag) => {
                        subscribers.retain(|(t, _)| t != &tag);
                        if subscribers.is_empty() {
                            polling = false;
                        }
                    }
                    Command::CloseSource(reply) => {
                        polling = false;
                        channels_initialized = false;
                        let result = match source.as_mut() {
                            Some(s) => s.close().await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
            _ = ticker.tick(), if polling => {
                let Some(src) = source.as_mut() else { continue };
                match src.get_data().await {
                    Ok(mut frame) => {
                        frame.pad_to_max_len();
                        let frame = Arc::new(frame);
                        for (tag, sink) in subscribers.iter() {
                            if sink.send(frame.clone()).is_err() {
                                warn!("subscriber '{tag}' is gone");
                            }
                        }
                    }
                    Err(e) => {
                        error!("acquisition source error, stopping poll: {e}");
                        polling = false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elemem_device::SimulatedAcquisitionSource;

    #[tokio::test]
    async fn fans_out_to_all_subscribers_in_order() {
        let hub = AcquisitionHubHandle::spawn(5);
        hub.set_source(Box::new(SimulatedAcquisitionSource::new(1, 3)));
        hub.initialize_channels(1000).await.unwrap();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register_callback("a", tx1);
        hub.register_callback("b", tx2);

        let mut total_a = 0;
        let mut total_b = 0;
        for _ in 0..3 {
            let frame_a = rx1.recv().await.unwrap();
            total_a += frame_a.channel(0).unwrap().len();
            let frame_b = rx2.recv().await.unwrap();
            total_b += frame_b.channel(0).unwrap().len();
        }
        assert_eq!(total_a, 9);
        assert_eq!(total_b, 9);
    }

    #[tokio::test]
    async fn removing_last_subscriber_stops_polling() {
        let hub = AcquisitionHubHandle::spawn(5);
        hub.set_source(Box::new(SimulatedAcquisitionSource::new(1, 2)));
        hub.initialize_channels(1000).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register_callback("a", tx);
        rx.recv().await.unwrap();
        hub.remove_callback("a");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
