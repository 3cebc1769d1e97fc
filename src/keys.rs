//! Key functions mapping samples and statuses to store keys

use url::Url;

use crate::endpoint::{EndpointSample, WeightedEndpointStatus};

/// Pluggable mapping from samples and statuses to store keys.
///
/// `endpoint_key` and `status_key` must agree: the key computed for a sample
/// has to equal the key computed for the status that sample updates.
pub trait KeyFunctions: Send + Sync + 'static {
    /// Per-service store a sample belongs to
    fn service_key(&self, sample: &EndpointSample) -> String;

    /// Endpoint a sample belongs to, within its service
    fn endpoint_key(&self, sample: &EndpointSample) -> String;

    /// Endpoint key re-derived from a stored status
    fn status_key(&self, status: &WeightedEndpointStatus) -> String;
}

/// Service key carried on the sample, endpoint keys derived from the probe URL.
///
/// Both endpoint keys come from [`endpoint_key_from_url`], so they agree even
/// when a caller fills in [`EndpointSample::endpoint_key`] by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeys;

impl KeyFunctions for DefaultKeys {
    fn service_key(&self, sample: &EndpointSample) -> String {
        sample.service_key.clone()
    }

    fn endpoint_key(&self, sample: &EndpointSample) -> String {
        endpoint_key_from_url(&sample.url)
    }

    fn status_key(&self, status: &WeightedEndpointStatus) -> String {
        endpoint_key_from_url(status.url())
    }
}

/// `host:port` of a probe target, falling back to the full URL
#[must_use]
pub fn endpoint_key_from_url(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => url.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_port() {
        let url = Url::parse("https://1.1.1.2:6443/healthz").unwrap();
        assert_eq!(endpoint_key_from_url(&url), "1.1.1.2:6443");
    }

    #[test]
    fn test_known_default_port() {
        let url = Url::parse("https://etcd-0.etcd.svc").unwrap();
        assert_eq!(endpoint_key_from_url(&url), "etcd-0.etcd.svc:443");
    }

    #[test]
    fn test_no_host_falls_back_to_url() {
        let url = Url::parse("unix:/var/run/etcd.sock").unwrap();
        assert_eq!(endpoint_key_from_url(&url), "unix:/var/run/etcd.sock");
    }

    #[test]
    fn test_default_keys_agree() {
        let url = Url::parse("https://10.0.0.7:2379").unwrap();
        let sample = EndpointSample::success("openshift-etcd/etcd", url.clone());
        let status = WeightedEndpointStatus::new(10, url);

        let keys = DefaultKeys;
        assert_eq!(keys.service_key(&sample), "openshift-etcd/etcd");
        assert_eq!(keys.endpoint_key(&sample), keys.status_key(&status));
    }

    #[test]
    fn test_default_keys_ignore_hand_written_label() {
        let url = Url::parse("https://10.0.0.7:2379").unwrap();
        let sample = EndpointSample {
            endpoint_key: "etcd-0".to_string(),
            service_key: "openshift-etcd/etcd".to_string(),
            url: url.clone(),
            error: None,
        };
        let status = WeightedEndpointStatus::new(10, url);

        let keys = DefaultKeys;
        assert_eq!(keys.endpoint_key(&sample), "10.0.0.7:2379");
        assert_eq!(keys.endpoint_key(&sample), keys.status_key(&status));
    }
}
