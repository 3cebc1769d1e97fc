//! Failure detector: batch intake, scoring and snapshot publication
//!
//! # Concurrency
//!
//! The live per-service stores are owned by the single batch worker and are
//! mutated without locks. Readers only ever see [`Snapshot`]s: immutable,
//! history-less copies of every live store, rebuilt from scratch and swapped
//! in atomically whenever a batch changes any endpoint's weight or status.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::batch::Collector;
use crate::config::Config;
use crate::endpoint::{EndpointSample, EndpointStatus, WeightedEndpointStatus};
use crate::keys::{DefaultKeys, KeyFunctions};
use crate::policy::{StatusEvaluator, simple_weighted_evaluator};
use crate::processor::Processor;
use crate::store::{EndpointStore, StoreFactory, SystemClock, memory_store_factory};
use crate::Result;

const SAMPLES_TOTAL: &str = "failure_detector_samples_total";
const BATCHES_TOTAL: &str = "failure_detector_batches_total";
const SNAPSHOTS_TOTAL: &str = "failure_detector_snapshots_published_total";
const ENDPOINTS_TRACKED: &str = "failure_detector_endpoints_tracked";

/// Scores endpoints from probe samples and publishes read-only snapshots
pub struct FailureDetector {
    processor: Processor,
    workers: usize,
    state: DetectorState,
}

impl FailureDetector {
    /// Detector with the default keys, policy and in-memory stores
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: &Config) -> Result<Self> {
        Self::builder(config.clone()).build()
    }

    /// Builder for swapping in custom keys, policy or stores
    #[must_use]
    pub fn builder(config: Config) -> FailureDetectorBuilder {
        FailureDetectorBuilder::new(config)
    }

    /// Producer handle accepting samples
    #[must_use]
    pub fn collector(&self) -> Collector<EndpointSample> {
        self.processor.collector()
    }

    /// Cloneable read handle that outlives [`run`](Self::run)
    #[must_use]
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            inner: Arc::clone(&self.state.published),
        }
    }

    /// Currently published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.published.load_full()
    }

    /// Apply one batch of samples directly, bypassing the queue
    pub fn process_batch(&mut self, samples: Vec<EndpointSample>) {
        self.state.process_batch(samples);
    }

    /// Process batches until `token` is cancelled or every collector is dropped.
    ///
    /// On cancellation the batch in flight completes; queued samples are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker count is not 1 or the worker panicked.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let Self {
            processor,
            workers,
            mut state,
        } = self;
        // The batch worker takes ownership of the live stores
        processor
            .run(token, workers, move |batch| state.process_batch(batch))
            .await
    }
}

impl fmt::Debug for FailureDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureDetector")
            .field("workers", &self.workers)
            .field("services", &self.state.live.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`FailureDetector`]
pub struct FailureDetectorBuilder {
    config: Config,
    keys: Arc<dyn KeyFunctions>,
    evaluator: Box<dyn StatusEvaluator>,
    create_store: StoreFactory,
}

impl FailureDetectorBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            keys: Arc::new(DefaultKeys),
            evaluator: Box::new(simple_weighted_evaluator),
            create_store: memory_store_factory(Arc::new(SystemClock)),
        }
    }

    /// Replace the key functions
    #[must_use]
    pub fn keys(mut self, keys: impl KeyFunctions) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// Replace the status policy
    #[must_use]
    pub fn evaluator(mut self, evaluator: impl StatusEvaluator) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    /// Replace the store constructor
    #[must_use]
    pub fn store_factory(mut self, create_store: StoreFactory) -> Self {
        self.create_store = create_store;
        self
    }

    /// Validate the configuration and assemble the detector
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn build(self) -> Result<FailureDetector> {
        self.config.validate()?;

        let published = Arc::new(ArcSwap::from_pointee(Snapshot::empty(Arc::clone(
            &self.keys,
        ))));
        let processor = Processor::new(&self.config.batch, Arc::clone(&self.keys));

        Ok(FailureDetector {
            processor,
            workers: self.config.batch.workers,
            state: DetectorState {
                keys: self.keys,
                evaluator: self.evaluator,
                create_store: self.create_store,
                live: HashMap::new(),
                published,
                history_capacity: self.config.detector.history_capacity,
                live_ttl: self.config.detector.live_ttl,
                snapshot_ttl: self.config.detector.snapshot_ttl,
            },
        })
    }
}

/// State owned by the batch worker
struct DetectorState {
    keys: Arc<dyn KeyFunctions>,
    evaluator: Box<dyn StatusEvaluator>,
    create_store: StoreFactory,
    /// Service key → live endpoint store
    live: HashMap<String, EndpointStore>,
    published: Arc<ArcSwap<Snapshot>>,
    history_capacity: usize,
    live_ttl: std::time::Duration,
    snapshot_ttl: std::time::Duration,
}

impl DetectorState {
    /// Record samples, re-score touched endpoints, publish on change.
    ///
    /// All samples of a batch are filed under the first sample's service.
    /// The batching queue guarantees single-service batches.
    fn process_batch(&mut self, samples: Vec<EndpointSample>) {
        let Some(first) = samples.first() else {
            return;
        };
        let batch_key = self.keys.service_key(first);
        telemetry_metrics::counter!(BATCHES_TOTAL).increment(1);
        telemetry_metrics::counter!(SAMPLES_TOTAL).increment(samples.len() as u64);

        let mut store = self
            .live
            .remove(&batch_key)
            .unwrap_or_else(|| (self.create_store)(self.live_ttl));

        let mut touched = HashSet::new();
        for sample in &samples {
            let endpoint_key = self.keys.endpoint_key(sample);
            let mut endpoint = store.remove(&endpoint_key).unwrap_or_else(|| {
                trace!(service = %batch_key, endpoint = %endpoint_key, "Tracking new endpoint");
                WeightedEndpointStatus::new(self.history_capacity, sample.url.clone())
            });
            endpoint.add(sample.to_sample());

            let status_key = self.keys.status_key(&endpoint);
            if status_key != endpoint_key {
                warn!(
                    service = %batch_key,
                    endpoint = %endpoint_key,
                    status_key = %status_key,
                    "Sample and status keys disagree, endpoint history will not accumulate"
                );
            }
            store.add(status_key.clone(), endpoint);
            touched.insert(status_key);
        }

        let mut has_changed = false;
        for status_key in &touched {
            let Some(endpoint) = store.get_mut(status_key) else {
                warn!(service = %batch_key, endpoint = %status_key, "Endpoint vanished before evaluation");
                continue;
            };
            let previous = endpoint.status();
            if self.evaluator.evaluate(endpoint) {
                has_changed = true;
                log_transition(&batch_key, status_key, previous, endpoint);
            }
        }

        debug!(
            service = %batch_key,
            samples = samples.len(),
            endpoints = touched.len(),
            changed = has_changed,
            "Processed batch"
        );

        self.live.insert(batch_key, store);
        if has_changed {
            self.evict_idle();
            self.publish();
        }
    }

    /// Sweep expired endpoints from every live store and forget services
    /// left without any
    fn evict_idle(&mut self) {
        self.live.retain(|service_key, store| {
            let evicted = store.evict_expired();
            if evicted > 0 {
                debug!(service = %service_key, evicted, "Evicted idle endpoints");
            }
            if store.is_empty() {
                debug!(service = %service_key, "Forgetting idle service");
                return false;
            }
            true
        });
    }

    /// Rebuild the snapshot from every live store and swap it in
    fn publish(&self) {
        let mut endpoints = 0usize;
        let services: HashMap<String, EndpointStore> = self
            .live
            .iter()
            .map(|(service_key, live_store)| {
                let mut copy = (self.create_store)(self.snapshot_ttl);
                for endpoint in live_store.list() {
                    let verdict = endpoint.snapshot_copy();
                    copy.add(self.keys.status_key(&verdict), verdict);
                    endpoints += 1;
                }
                (service_key.clone(), copy)
            })
            .collect();

        debug!(services = services.len(), endpoints, "Publishing snapshot");
        telemetry_metrics::counter!(SNAPSHOTS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        let tracked = endpoints as f64;
        telemetry_metrics::gauge!(ENDPOINTS_TRACKED).set(tracked);

        self.published.store(Arc::new(Snapshot {
            services,
            keys: Arc::clone(&self.keys),
        }));
    }
}

fn log_transition(
    service: &str,
    endpoint_key: &str,
    previous: EndpointStatus,
    endpoint: &WeightedEndpointStatus,
) {
    match (previous, endpoint.status()) {
        (EndpointStatus::Unset, EndpointStatus::TooManyErrors) => {
            warn!(service, endpoint = endpoint_key, url = %endpoint.url(), "Endpoint marked unhealthy: too many errors");
        }
        (EndpointStatus::TooManyErrors, EndpointStatus::Unset) => {
            info!(service, endpoint = endpoint_key, weight = endpoint.weight(), "Endpoint recovered");
        }
        _ => {
            trace!(service, endpoint = endpoint_key, weight = endpoint.weight(), "Endpoint weight changed");
        }
    }
}

/// Immutable, history-less view of every endpoint verdict
pub struct Snapshot {
    services: HashMap<String, EndpointStore>,
    keys: Arc<dyn KeyFunctions>,
}

impl Snapshot {
    fn empty(keys: Arc<dyn KeyFunctions>) -> Self {
        Self {
            services: HashMap::new(),
            keys,
        }
    }

    /// Endpoint store of one service
    #[must_use]
    pub fn service(&self, service_key: &str) -> Option<&EndpointStore> {
        self.services.get(service_key)
    }

    /// Verdict for one endpoint
    #[must_use]
    pub fn endpoint(&self, service_key: &str, endpoint_key: &str) -> Option<EndpointVerdict> {
        self.service(service_key)?
            .get(endpoint_key)
            .map(EndpointVerdict::from)
    }

    /// Keys of every published service
    pub fn service_keys(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of published services
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether nothing has been published yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Every verdict, ordered by service then endpoint key
    #[must_use]
    pub fn verdicts(&self) -> BTreeMap<String, BTreeMap<String, EndpointVerdict>> {
        self.services
            .iter()
            .map(|(service_key, store)| {
                let endpoints = store
                    .list()
                    .into_iter()
                    .map(|endpoint| (self.keys.status_key(endpoint), EndpointVerdict::from(endpoint)))
                    .collect();
                (service_key.clone(), endpoints)
            })
            .collect()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Published verdict for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointVerdict {
    /// Probe target
    pub url: String,
    /// Health weight in `[0, 1]`
    pub weight: f32,
    /// Discrete verdict
    pub status: EndpointStatus,
}

impl From<&WeightedEndpointStatus> for EndpointVerdict {
    fn from(endpoint: &WeightedEndpointStatus) -> Self {
        Self {
            url: endpoint.url().to_string(),
            weight: endpoint.weight(),
            status: endpoint.status(),
        }
    }
}

/// Lock-free read handle on the published snapshot
#[derive(Clone)]
pub struct SnapshotReader {
    inner: Arc<ArcSwap<Snapshot>>,
}

impl SnapshotReader {
    /// Current snapshot; never blocks the writer or other readers
    #[must_use]
    pub fn load(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }
}

impl fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("services", &self.inner.load().len())
            .finish()
    }
}
