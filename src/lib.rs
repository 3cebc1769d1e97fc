//! Endpoint Failure Detector
//!
//! Scores the health of backend endpoints from a stream of probe outcomes and
//! publishes a consistent, lock-free snapshot that routing code can consult
//! without touching the ingestion path.
//!
//! # Pipeline
//!
//! - **Ingestion**: producers submit [`EndpointSample`]s through a [`Collector`]
//! - **Batching**: samples are grouped per service and handed to one worker
//! - **Scoring**: each endpoint keeps a short ring buffer of outcomes that a
//!   [`StatusEvaluator`] turns into a weight and a status
//! - **Publication**: on any change the worker rebuilds a history-less
//!   [`Snapshot`] and swaps it in atomically
//!
//! The detector does not probe, route, or persist anything.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod detector;
pub mod endpoint;
pub mod error;
pub mod keys;
pub mod policy;
pub mod processor;
pub mod store;

pub use batch::Collector;
pub use detector::{EndpointVerdict, FailureDetector, Snapshot, SnapshotReader};
pub use endpoint::{EndpointSample, EndpointStatus, Sample, WeightedEndpointStatus};
pub use error::{Error, Result};
pub use policy::StatusEvaluator;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
