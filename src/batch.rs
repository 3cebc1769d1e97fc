//! Keyed batching queue
//!
//! Producers push single items through cloneable [`Collector`] handles. The
//! queue groups pending items by batch key and hands each group to a worker
//! once it reaches `max_batch_size` or on the next `flush_interval` tick.
//!
//! Every worker owns its handler. A key is always routed to the same worker,
//! so batches of one key are processed in submission order and a batch never
//! mixes keys.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::BatchConfig;
use crate::{Error, Result};

/// Batches waiting per worker before the dispatcher waits
const WORKER_QUEUE_DEPTH: usize = 16;

/// Maps an item to the key it is batched under
pub type BatchKeyFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Write side of a [`BatchQueue`]
#[derive(Debug)]
pub struct Collector<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Collector<T> {
    /// Queue an item, waiting while the queue is full
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] once the queue has stopped.
    pub async fn submit(&self, item: T) -> Result<()> {
        self.tx.send(item).await.map_err(|_| Error::QueueClosed)
    }

    /// Queue an item without waiting, handing it back if full or closed
    pub fn try_submit(&self, item: T) -> std::result::Result<(), T> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        })
    }

    /// Whether the queue has stopped accepting items
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Keyed batching queue with a fixed set of workers
pub struct BatchQueue<T> {
    tx: mpsc::Sender<T>,
    rx: mpsc::Receiver<T>,
    key_fn: BatchKeyFn<T>,
    max_batch_size: usize,
    flush_interval: Duration,
}

impl<T: Send + 'static> BatchQueue<T> {
    /// Create an idle queue
    pub fn new(config: &BatchConfig, key_fn: BatchKeyFn<T>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            tx,
            rx,
            key_fn,
            max_batch_size: config.max_batch_size.max(1),
            flush_interval: config.flush_interval,
        }
    }

    /// Producer handle
    #[must_use]
    pub fn collector(&self) -> Collector<T> {
        Collector {
            tx: self.tx.clone(),
        }
    }

    /// Dispatch batches to one worker per handler until cancelled or until
    /// every [`Collector`] is dropped.
    ///
    /// When the collectors are gone, pending items are flushed and workers
    /// drain their queues before this returns. On cancellation each worker
    /// finishes the batch it is handling; anything still queued is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `handlers` is empty or a worker panicked.
    pub async fn run<H>(self, token: CancellationToken, handlers: Vec<H>) -> Result<()>
    where
        H: FnMut(Vec<T>) + Send + 'static,
    {
        if handlers.is_empty() {
            return Err(Error::UnsupportedWorkerCount(0));
        }

        let Self {
            tx,
            mut rx,
            key_fn,
            max_batch_size,
            flush_interval,
        } = self;
        // Only external collectors keep the channel open from here on
        drop(tx);

        let mut senders = Vec::with_capacity(handlers.len());
        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(handlers.len());
        for (id, handler) in handlers.into_iter().enumerate() {
            let (batch_tx, batch_rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
            senders.push(batch_tx);
            workers.push(tokio::spawn(worker_loop(
                id,
                batch_rx,
                handler,
                token.clone(),
            )));
        }
        debug!(workers = workers.len(), max_batch_size, "Batch queue started");

        let mut pending: HashMap<String, Vec<T>> = HashMap::new();
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(dropped = pending.values().map(Vec::len).sum::<usize>(), "Batch queue cancelled");
                    break;
                }
                item = rx.recv() => {
                    let Some(item) = item else {
                        flush_all(&mut pending, &senders).await;
                        debug!("All collectors dropped, batch queue draining");
                        break;
                    };
                    let key = key_fn(&item);
                    let batch = pending.entry(key.clone()).or_default();
                    batch.push(item);
                    if batch.len() >= max_batch_size {
                        let batch = std::mem::take(batch);
                        dispatch(&senders, &key, batch).await;
                    }
                }
                _ = ticker.tick() => {
                    flush_all(&mut pending, &senders).await;
                }
            }
        }

        drop(senders);
        for worker in workers {
            worker.await.map_err(|e| Error::Worker(e.to_string()))?;
        }
        Ok(())
    }
}

/// Dispatch every non-empty pending batch
async fn flush_all<T>(pending: &mut HashMap<String, Vec<T>>, senders: &[mpsc::Sender<Vec<T>>]) {
    for (key, batch) in pending.drain() {
        if !batch.is_empty() {
            dispatch(senders, &key, batch).await;
        }
    }
}

/// Hand a batch to the worker owning `key`
async fn dispatch<T>(senders: &[mpsc::Sender<Vec<T>>], key: &str, batch: Vec<T>) {
    let Some(sender) = senders.get(worker_for(key, senders.len())) else {
        return;
    };
    let size = batch.len();
    if sender.send(batch).await.is_err() {
        warn!(key, size, "Batch worker stopped, dropping batch");
    }
}

/// Stable worker index for a batch key
#[allow(clippy::cast_possible_truncation)]
fn worker_for(key: &str, workers: usize) -> usize {
    if workers <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

async fn worker_loop<T, H>(
    id: usize,
    mut batches: mpsc::Receiver<Vec<T>>,
    mut handler: H,
    token: CancellationToken,
) where
    H: FnMut(Vec<T>),
{
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            batch = batches.recv() => {
                let Some(batch) = batch else { break };
                let size = batch.len();
                handler(batch);
                trace!(worker = id, size, "Batch handled");
            }
        }
    }
    debug!(worker = id, "Batch worker stopped");
}
