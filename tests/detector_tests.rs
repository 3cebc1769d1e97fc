//! End-to-end detector tests: ingestion, batching, scoring and publication

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use failure_detector::config::Config;
use failure_detector::keys::KeyFunctions;
use failure_detector::{
    EndpointSample, EndpointStatus, FailureDetector, SnapshotReader, WeightedEndpointStatus,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use url::Url;

const SERVICE: &str = "openshift-etcd/etcd";
const ENDPOINT: &str = "10.0.0.1:2379";

fn url(host: &str) -> Url {
    Url::parse(&format!("https://{host}:2379")).unwrap()
}

fn sample(host: &str, error: bool) -> EndpointSample {
    if error {
        EndpointSample::failure(SERVICE, url(host), "connection refused")
    } else {
        EndpointSample::success(SERVICE, url(host))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn error_count(weight: f32) -> usize {
    ((1.0 - weight) * 10.0).round() as usize
}

/// Poll the reader until `check` holds or a generous deadline passes
async fn wait_for(reader: &SnapshotReader, check: impl Fn(&SnapshotReader) -> bool) -> bool {
    for _ in 0..500 {
        if check(reader) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_alternating_stream_converges_to_last_window() {
    let detector = FailureDetector::new(&Config::default()).unwrap();
    let collector = detector.collector();
    let reader = detector.reader();
    let run = tokio::spawn(detector.run(CancellationToken::new()));

    let outcomes: Vec<bool> = (0..1000).map(|i| i % 3 == 0).collect();
    for &error in &outcomes {
        collector.submit(sample("10.0.0.1", error)).await.unwrap();
    }
    drop(collector);
    run.await.unwrap().unwrap();

    let expected_errors = outcomes.iter().rev().take(10).filter(|e| **e).count();
    let verdict = reader.load().endpoint(SERVICE, ENDPOINT).unwrap();
    assert_eq!(error_count(verdict.weight), expected_errors);
    assert_eq!(verdict.status, EndpointStatus::Unset);
}

#[tokio::test]
async fn test_all_errors_flag_endpoint_until_next_success() {
    let detector = FailureDetector::new(&Config::default()).unwrap();
    let collector = detector.collector();
    let reader = detector.reader();
    let token = CancellationToken::new();
    let run = tokio::spawn(detector.run(token.clone()));

    for i in 0..50 {
        collector.submit(sample("10.0.0.1", i >= 30)).await.unwrap();
    }
    let flagged = wait_for(&reader, |r| {
        r.load()
            .endpoint(SERVICE, ENDPOINT)
            .is_some_and(|v| v.status == EndpointStatus::TooManyErrors)
    })
    .await;
    assert!(flagged, "endpoint never marked as too many errors");
    assert!(reader.load().endpoint(SERVICE, ENDPOINT).unwrap().weight.abs() < f32::EPSILON);

    collector.submit(sample("10.0.0.1", false)).await.unwrap();
    let recovered = wait_for(&reader, |r| {
        r.load()
            .endpoint(SERVICE, ENDPOINT)
            .is_some_and(|v| v.status == EndpointStatus::Unset)
    })
    .await;
    assert!(recovered, "endpoint never recovered after a success");
    assert_eq!(
        error_count(reader.load().endpoint(SERVICE, ENDPOINT).unwrap().weight),
        9
    );

    token.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_services_are_scored_independently() {
    let detector = FailureDetector::new(&Config::default()).unwrap();
    let collector = detector.collector();
    let reader = detector.reader();
    let run = tokio::spawn(detector.run(CancellationToken::new()));

    for _ in 0..10 {
        collector
            .submit(EndpointSample::failure("default/kubernetes", url("10.0.1.1"), "timeout"))
            .await
            .unwrap();
        collector.submit(sample("10.0.0.1", false)).await.unwrap();
        collector.submit(sample("10.0.0.2", true)).await.unwrap();
    }
    drop(collector);
    run.await.unwrap().unwrap();

    let snapshot = reader.load();
    let api = snapshot.endpoint("default/kubernetes", "10.0.1.1:2379").unwrap();
    assert_eq!(api.status, EndpointStatus::TooManyErrors);

    let etcd = snapshot.verdicts().remove(SERVICE).unwrap();
    assert_eq!(etcd.len(), 2);
    assert_eq!(etcd["10.0.0.2:2379"].status, EndpointStatus::TooManyErrors);
    // A healthy endpoint only shows up because its service was republished
    assert_eq!(error_count(etcd["10.0.0.1:2379"].weight), 0);
}

#[tokio::test]
async fn test_cancelled_detector_rejects_samples() {
    let detector = FailureDetector::new(&Config::default()).unwrap();
    let collector = detector.collector();
    let token = CancellationToken::new();
    token.cancel();

    detector.run(token).await.unwrap();

    assert!(collector.submit(sample("10.0.0.1", true)).await.is_err());
}

#[test]
fn test_readers_never_see_partial_batches() {
    let mut detector = FailureDetector::new(&Config::default()).unwrap();
    let reader = detector.reader();
    let stop = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = reader.clone();
            let stop = stop.clone();
            let observed = observed.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let snapshot = reader.load();
                    let a = snapshot.endpoint(SERVICE, "10.0.0.1:2379");
                    let b = snapshot.endpoint(SERVICE, "10.0.0.2:2379");
                    match (a, b) {
                        (Some(a), Some(b)) => {
                            assert_eq!(a.weight.to_bits(), b.weight.to_bits());
                            assert_eq!(a.status, b.status);
                            observed.fetch_add(1, Ordering::Relaxed);
                        }
                        (None, None) => {}
                        other => panic!("partial snapshot: {other:?}"),
                    }
                }
            })
        })
        .collect();

    for i in 0..2000 {
        let error = i % 3 != 0;
        detector.process_batch(vec![sample("10.0.0.1", error), sample("10.0.0.2", error)]);
    }
    // Keep publishing until every reader has had a chance to look
    while observed.load(Ordering::Relaxed) < 100 {
        detector.process_batch(vec![sample("10.0.0.1", true), sample("10.0.0.2", true)]);
        detector.process_batch(vec![sample("10.0.0.1", false), sample("10.0.0.2", false)]);
    }
    stop.store(true, Ordering::Relaxed);

    for handle in readers {
        handle.join().unwrap();
    }
}

/// Keys endpoints by their full probe URL instead of `host:port`
struct ByUrl;

impl KeyFunctions for ByUrl {
    fn service_key(&self, sample: &EndpointSample) -> String {
        sample.service_key.clone()
    }

    fn endpoint_key(&self, sample: &EndpointSample) -> String {
        sample.url.to_string()
    }

    fn status_key(&self, status: &WeightedEndpointStatus) -> String {
        status.url().to_string()
    }
}

#[test]
fn test_custom_key_functions() {
    let mut detector = FailureDetector::builder(Config::default())
        .keys(ByUrl)
        .build()
        .unwrap();

    let health = Url::parse("https://10.0.0.1:2379/health").unwrap();
    let readyz = Url::parse("https://10.0.0.1:2379/readyz").unwrap();
    detector.process_batch(vec![
        EndpointSample::failure(SERVICE, health.clone(), "500"),
        EndpointSample::success(SERVICE, readyz.clone()),
        EndpointSample::failure(SERVICE, readyz.clone(), "503"),
    ]);

    let snapshot = detector.snapshot();
    assert_eq!(snapshot.service(SERVICE).unwrap().len(), 2);
    assert_eq!(
        error_count(snapshot.endpoint(SERVICE, health.as_str()).unwrap().weight),
        1
    );
    assert_eq!(
        error_count(snapshot.endpoint(SERVICE, readyz.as_str()).unwrap().weight),
        1
    );
}
