//! Event Log (half of C10): an append-only JSON-lines file with a 5 s flush
//! policy, grounded on `EventLog.cpp`'s `StartFile`/`Log`/`CloseFile`.

use std::io::Write;
use std::time::Duration;

use elemem_types::{ElememError, EventRecord};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

enum Command {
    Open(String, oneshot::Sender<Result<(), ElememError>>),
    Log(EventRecord),
    Close(oneshot::Sender<Result<(), ElememError>>),
}

/// A cheaply-clonable handle to the running event-log actor.
#[derive(Clone)]
pub struct EventLogHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EventLogHandle {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    pub async fn open(&self, path: impl Into<String>) -> Result<(), ElememError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Open(path.into(), reply_tx))
            .map_err(|_| ElememError::fatal("event log actor is gone"))?;
        reply_rx.await.map_err(|_| ElememError::fatal("event log actor dropped reply"))?
    }

    /// Fire-and-forget append; failures are not observable by the caller,
    /// matching the teacher's `Log_Handler` which never returns a value.
    pub fn log(&self, record: EventRecord) {
        if self.tx.send(Command::Log(record)).is_err() {
            error!("event log actor is gone, dropping record");
        }
    }

    pub async fn close(&self) -> Result<(), ElememError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Close(reply_tx))
            .map_err(|_| ElememError::fatal("event log actor is gone"))?;
        reply_rx.await.map_err(|_| ElememError::fatal("event log actor dropped reply"))?
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut file: Option<std::fs::File> = None;
    let mut last_flush = tokio::time::Instant::now();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Open(path, reply) => {
                let result = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map(|f| {
                        file = Some(f);
                        last_flush = tokio::time::Instant::now();
                    })
                    .map_err(|e| ElememError::file_format(format!("cannot open event log {path}: {e}")));
                let _ = reply.send(result);
            }
            Command::Log(record) => {
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.write_all(record.to_line().as_bytes()) {
                        warn!("event log write failed: {e}");
                    }
                    if last_flush.elapsed() >= FLUSH_INTERVAL {
                        let _ = f.flush();
                        last_flush = tokio::time::Instant::now();
                    }
                }
            }
            Command::Close(reply) => {
                let result = if let Some(mut f) = file.take() {
                    f.flush().map_err(|e| ElememError::fatal(format!("event log flush failed: {e}")))
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elemem_types::event::kind;

    #[tokio::test]
    async fn opens_writes_and_closes() {
        let dir = std::env::temp_dir().join(format!("elemem_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.jsonl");

        let handle = EventLogHandle::spawn();
        handle.open(path.to_str().unwrap()).await.unwrap();
        handle.log(EventRecord::new(0, kind::START));
        handle.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("START"));
    }
}
