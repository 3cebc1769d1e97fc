//! Glue between the batching queue and the detector's batch callback

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::batch::{BatchQueue, Collector};
use crate::config::BatchConfig;
use crate::endpoint::EndpointSample;
use crate::keys::KeyFunctions;
use crate::{Error, Result};

/// Feeds batches of [`EndpointSample`]s, grouped by service key, to a handler
pub struct Processor {
    queue: BatchQueue<EndpointSample>,
}

impl Processor {
    /// Create a processor batching samples by `keys.service_key`
    pub fn new(config: &BatchConfig, keys: Arc<dyn KeyFunctions>) -> Self {
        let key_fn = Arc::new(move |sample: &EndpointSample| keys.service_key(sample));
        Self {
            queue: BatchQueue::new(config, key_fn),
        }
    }

    /// Producer handle for submitting samples
    #[must_use]
    pub fn collector(&self) -> Collector<EndpointSample> {
        self.queue.collector()
    }

    /// Run `handler` over batches until cancelled or all collectors are dropped.
    ///
    /// The handler owns unsynchronized state, so exactly one worker is supported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedWorkerCount`] when `workers != 1`, or a
    /// worker error if the handler panicked.
    pub async fn run<H>(self, token: CancellationToken, workers: usize, handler: H) -> Result<()>
    where
        H: FnMut(Vec<EndpointSample>) + Send + 'static,
    {
        if workers != 1 {
            return Err(Error::UnsupportedWorkerCount(workers));
        }

        info!(workers, "Starting sample processor");
        let result = self.queue.run(token, vec![handler]).await;
        info!("Sample processor stopped");
        result
    }
}
