//! Endpoint samples and weighted endpoint status
//!
//! A [`WeightedEndpointStatus`] keeps a short circular history of probe
//! outcomes for one endpoint together with the verdict (weight and status)
//! last computed from that history by a [`StatusEvaluator`].
//!
//! [`StatusEvaluator`]: crate::policy::StatusEvaluator

mod ring;

pub use ring::RingBuffer;

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::keys::endpoint_key_from_url;

/// Reduced, storage-only result of one probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    /// Probe error, `None` on success
    pub error: Option<String>,
}

impl Sample {
    /// A successful probe outcome
    #[must_use]
    pub fn success() -> Self {
        Self { error: None }
    }

    /// A failed probe outcome
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }

    /// Whether this outcome carries an error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Probe outcome as submitted by producers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSample {
    /// Caller-facing identity of the endpoint within its service.
    ///
    /// [`DefaultKeys`](crate::keys::DefaultKeys) store endpoints under the
    /// URL-derived key instead; custom key functions may use this label.
    pub endpoint_key: String,
    /// Service the endpoint belongs to (e.g. `namespace/service`)
    pub service_key: String,
    /// Probe target
    pub url: Url,
    /// Probe error, `None` on success
    pub error: Option<String>,
}

impl EndpointSample {
    /// Create a sample whose endpoint key is derived from `url`.
    ///
    /// Deriving the key from the URL keeps it equal to the key the default
    /// [`KeyFunctions`](crate::keys::KeyFunctions) compute for the stored status.
    pub fn new(service_key: impl Into<String>, url: Url, error: Option<String>) -> Self {
        Self {
            endpoint_key: endpoint_key_from_url(&url),
            service_key: service_key.into(),
            url,
            error,
        }
    }

    /// A successful probe against `url`
    pub fn success(service_key: impl Into<String>, url: Url) -> Self {
        Self::new(service_key, url, None)
    }

    /// A failed probe against `url`
    pub fn failure(service_key: impl Into<String>, url: Url, error: impl Into<String>) -> Self {
        Self::new(service_key, url, Some(error.into()))
    }

    /// Reduce to the outcome kept in endpoint history
    #[must_use]
    pub fn to_sample(&self) -> Sample {
        Sample {
            error: self.error.clone(),
        }
    }
}

/// Discrete verdict layered on top of the weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// No verdict
    #[default]
    Unset,
    /// Every retained sample is an error
    TooManyErrors,
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            Self::TooManyErrors => f.write_str("too_many_errors"),
        }
    }
}

/// Health record for one endpoint
#[derive(Debug, Clone)]
pub struct WeightedEndpointStatus {
    url: Url,
    history: RingBuffer<Sample>,
    weight: f32,
    status: EndpointStatus,
}

impl WeightedEndpointStatus {
    /// Create a fully healthy record retaining up to `capacity` samples.
    ///
    /// `capacity = 0` creates a history-less record, as used by snapshots.
    #[must_use]
    pub fn new(capacity: usize, url: Url) -> Self {
        Self {
            url,
            history: RingBuffer::new(capacity),
            weight: 1.0,
            status: EndpointStatus::Unset,
        }
    }

    /// Record a probe outcome, overwriting the oldest one when full
    pub fn add(&mut self, sample: Sample) {
        self.history.push(sample);
    }

    /// Retained samples, oldest first
    #[must_use]
    pub fn get(&self) -> Vec<&Sample> {
        self.history.get()
    }

    /// Retained history
    #[must_use]
    pub fn history(&self) -> &RingBuffer<Sample> {
        &self.history
    }

    /// Configured history capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Probe target of this endpoint
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Health weight in `[0, 1]`
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Current verdict
    #[must_use]
    pub fn status(&self) -> EndpointStatus {
        self.status
    }

    /// Set the weight. Intended for status evaluators only.
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.clamp(0.0, 1.0);
    }

    /// Set the verdict. Intended for status evaluators only.
    pub fn set_status(&mut self, status: EndpointStatus) {
        self.status = status;
    }

    /// History-less copy carrying only url, weight and status
    #[must_use]
    pub fn snapshot_copy(&self) -> Self {
        Self {
            url: self.url.clone(),
            history: RingBuffer::new(0),
            weight: self.weight,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://10.0.0.1:2379").unwrap()
    }

    #[test]
    fn test_new_endpoint_is_healthy() {
        let endpoint = WeightedEndpointStatus::new(10, url());
        assert!((endpoint.weight() - 1.0).abs() < f32::EPSILON);
        assert_eq!(endpoint.status(), EndpointStatus::Unset);
        assert_eq!(endpoint.capacity(), 10);
        assert!(endpoint.get().is_empty());
    }

    #[test]
    fn test_add_wraps_history() {
        let mut endpoint = WeightedEndpointStatus::new(3, url());
        for i in 0..5 {
            endpoint.add(Sample::failure(i.to_string()));
        }
        let errors: Vec<_> = endpoint
            .get()
            .into_iter()
            .map(|s| s.error.clone().unwrap())
            .collect();
        assert_eq!(errors, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_snapshot_copy_drops_history() {
        let mut endpoint = WeightedEndpointStatus::new(10, url());
        endpoint.add(Sample::failure("boom"));
        endpoint.set_weight(0.9);
        endpoint.set_status(EndpointStatus::TooManyErrors);

        let copy = endpoint.snapshot_copy();
        assert_eq!(copy.capacity(), 0);
        assert!(copy.get().is_empty());
        assert_eq!(copy.url(), endpoint.url());
        assert!((copy.weight() - 0.9).abs() < f32::EPSILON);
        assert_eq!(copy.status(), EndpointStatus::TooManyErrors);

        let mut copy = copy;
        copy.add(Sample::success());
        assert!(copy.get().is_empty());
    }

    #[test]
    fn test_set_weight_clamps() {
        let mut endpoint = WeightedEndpointStatus::new(10, url());
        endpoint.set_weight(1.5);
        assert!((endpoint.weight() - 1.0).abs() < f32::EPSILON);
        endpoint.set_weight(-0.5);
        assert!(endpoint.weight().abs() < f32::EPSILON);
    }

    #[test]
    fn test_endpoint_sample_key_from_url() {
        let sample = EndpointSample::failure("etcd/etcd", url(), "refused");
        assert_eq!(sample.endpoint_key, "10.0.0.1:2379");
        assert_eq!(sample.service_key, "etcd/etcd");
        assert!(sample.to_sample().is_error());
        assert!(!EndpointSample::success("etcd/etcd", url()).to_sample().is_error());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(EndpointStatus::Unset.to_string(), "unset");
        assert_eq!(EndpointStatus::TooManyErrors.to_string(), "too_many_errors");
    }
}
