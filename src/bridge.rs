use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use thiserror::Error;
use tokio::{
    sync::{Mutex, mpsc, mpsc::error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    db::{StorageError, StorageRow, StorageSink},
    reading::{Message, ParseError},
};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Turns inbound payloads into stored rows. Nothing is retried: a payload
/// that cannot be parsed or stored is logged and dropped.
pub struct IngestionBridge<S> {
    sink: S,
}

impl<S: StorageSink> IngestionBridge<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn handle(&self, payload: &[u8]) -> Result<(), IngestError> {
        let message = Message::from_slice(payload)?;
        let row = StorageRow::from(message);
        self.sink.insert(&row).await?;

        debug!(device_id = %row.device_id, time = %row.time, "stored sensor reading");
        Ok(())
    }

    pub async fn handle_logged(&self, payload: &[u8]) {
        match self.handle(payload).await {
            Ok(()) => {}
            Err(IngestError::Parse(err)) => {
                warn!(
                    payload = %String::from_utf8_lossy(payload),
                    "dropping unparseable message: {err}"
                );
            }
            Err(IngestError::Storage(err)) => {
                error!("dropping message: {err}");
            }
        }
    }
}

/// Receipt side of the ingest queue. Offering never waits: when the queue is
/// full the arriving payload is dropped.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<Vec<u8>>,
    dropped: Arc<AtomicU64>,
}

impl IngestQueue {
    pub fn offer(&self, payload: &[u8]) -> bool {
        match self.tx.try_send(payload.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "ingest queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("ingest queue closed, dropping message");
                false
            }
        }
    }

    /// Payloads dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct IngestWorkers {
    handles: Vec<JoinHandle<()>>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl IngestWorkers {
    /// Waits for in-flight writes to finish and returns how many queued
    /// payloads were left unprocessed.
    pub async fn join(self) -> usize {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!("ingest worker panicked: {err}");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "discarded queued messages on shutdown");
        }

        discarded
    }
}

/// Starts `workers` storage writers fed by a queue of `capacity` payloads.
/// Workers stop taking new payloads once `shutdown` is cancelled.
pub fn start<S>(
    bridge: Arc<IngestionBridge<S>>,
    capacity: usize,
    workers: usize,
    shutdown: CancellationToken,
) -> (IngestQueue, IngestWorkers)
where
    S: StorageSink + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let rx = Arc::new(Mutex::new(rx));

    let handles = (0..workers.max(1))
        .map(|id| {
            tokio::spawn(work(
                id,
                bridge.clone(),
                rx.clone(),
                shutdown.clone(),
            ))
        })
        .collect();
    info!(capacity, workers, "ingest workers started");

    let queue = IngestQueue {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };

    (queue, IngestWorkers { handles, rx })
}

async fn work<S: StorageSink>(
    id: usize,
    bridge: Arc<IngestionBridge<S>>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    shutdown: CancellationToken,
) {
    loop {
        let payload = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                payload = rx.recv() => payload,
            }
        };
        let Some(payload) = payload else {
            break;
        };

        bridge.handle_logged(&payload).await;
    }

    debug!(worker = id, "ingest worker stopped");
}
