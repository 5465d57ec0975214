//! Full-cycle rotation behavior through the public dispatcher API, with a
//! canned transport and a real cache file on disk.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use satcheck::common::messages::{CheckStatus, Location, LocationResult, WireResponse};
use satcheck::rotation::RotationStore;
use satcheck::transport::{Transport, TransportError};
use satcheck::Dispatcher;

/// Transport answering a fixed status per hostname and recording every call.
struct CannedTransport {
    statuses: HashMap<String, CheckStatus>,
    calls: Mutex<Vec<String>>,
}

impl CannedTransport {
    fn new(statuses: &[(&str, CheckStatus)]) -> Arc<Self> {
        Arc::new(Self {
            statuses: statuses
                .iter()
                .map(|(h, s)| (h.to_string(), *s))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn call(
        &self,
        location: &Location,
        _command: &Value,
    ) -> Result<WireResponse, TransportError> {
        self.calls.lock().unwrap().push(location.hostname.clone());
        let status = self.statuses[&location.hostname];
        Ok(WireResponse {
            status: "ok".to_string(),
            message: None,
            data: Some(LocationResult {
                status,
                message: format!("probe from {}", location.hostname),
                hostname: location.hostname.clone(),
                stats: None,
                debug: None,
                tags: Vec::new(),
            }),
        })
    }
}

fn five_locations() -> Vec<Location> {
    ["a", "b", "c", "d", "e"]
        .iter()
        .enumerate()
        .map(|(i, h)| Location::new(&format!("{}.example.net", h), &format!("192.0.2.{}", i + 1)))
        .collect()
}

fn flagged_hostname(cache: &std::path::Path, configured: &[Location]) -> Option<String> {
    let store = RotationStore::open(cache).unwrap();
    store
        .reconcile("svc", configured)
        .iter()
        .find(|l| l.last)
        .map(|l| l.hostname.clone())
}

#[tokio::test]
async fn window_starts_after_the_marker_and_moves_it() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("rotation.json");
    let configured = five_locations();

    // Seed the cache with the marker on the second location.
    {
        let mut store = RotationStore::open(&cache).unwrap();
        let mut state = store.reconcile("svc", &configured);
        state[1].last = true;
        store.persist("svc", &state).unwrap();
    }

    // Every satellite is CRITICAL, so the whole window is attempted.
    let transport = CannedTransport::new(&[
        ("a.example.net", CheckStatus::Critical),
        ("b.example.net", CheckStatus::Critical),
        ("c.example.net", CheckStatus::Critical),
        ("d.example.net", CheckStatus::Critical),
        ("e.example.net", CheckStatus::Critical),
    ]);
    let dispatcher = Dispatcher::new(transport.clone(), 3);

    let verdict = dispatcher
        .rotate("svc", Some(&cache), &configured, &Value::Null)
        .await;

    assert_eq!(verdict.status, CheckStatus::Critical);
    assert_eq!(
        transport.calls(),
        vec!["c.example.net", "d.example.net", "e.example.net"]
    );
    // The marker moved to the last attempted location.
    assert_eq!(
        flagged_hostname(&cache, &configured).as_deref(),
        Some("e.example.net")
    );
}

#[tokio::test]
async fn healthy_rotation_cycles_through_every_location_before_repeating() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("rotation.json");
    let configured = five_locations();

    let transport = CannedTransport::new(&[
        ("a.example.net", CheckStatus::Ok),
        ("b.example.net", CheckStatus::Ok),
        ("c.example.net", CheckStatus::Ok),
        ("d.example.net", CheckStatus::Ok),
        ("e.example.net", CheckStatus::Ok),
    ]);
    let dispatcher = Dispatcher::new(transport.clone(), 3);

    // Each run stops at its first (OK) location, so the window advances by
    // exactly one per run and a full cycle visits everyone once.
    for _ in 0..6 {
        let verdict = dispatcher
            .rotate("svc", Some(&cache), &configured, &Value::Null)
            .await;
        assert_eq!(verdict.status, CheckStatus::Ok);
    }

    assert_eq!(
        transport.calls(),
        vec![
            "a.example.net",
            "b.example.net",
            "c.example.net",
            "d.example.net",
            "e.example.net",
            "a.example.net",
        ]
    );
}

#[tokio::test]
async fn reconfiguration_updates_the_persisted_cache() {
    let dir = tempdir().unwrap();
    let cache = dir.path().join("rotation.json");
    let configured = five_locations();

    let transport = CannedTransport::new(&[
        ("a.example.net", CheckStatus::Ok),
        ("b.example.net", CheckStatus::Ok),
        ("c.example.net", CheckStatus::Ok),
        ("d.example.net", CheckStatus::Ok),
        ("e.example.net", CheckStatus::Ok),
        ("f.example.net", CheckStatus::Ok),
    ]);
    let dispatcher = Dispatcher::new(transport.clone(), 3);

    dispatcher
        .rotate("svc", Some(&cache), &configured, &Value::Null)
        .await;

    // Drop b, add f: the next run's cache must reflect the new set, sorted.
    let mut changed: Vec<Location> = configured
        .iter()
        .filter(|l| l.hostname != "b.example.net")
        .cloned()
        .collect();
    changed.push(Location::new("f.example.net", "192.0.2.6"));

    dispatcher
        .rotate("svc", Some(&cache), &changed, &Value::Null)
        .await;

    let store = RotationStore::open(&cache).unwrap();
    let state = store.reconcile("svc", &changed);
    let hostnames: Vec<&str> = state.iter().map(|l| l.hostname.as_str()).collect();
    assert_eq!(
        hostnames,
        vec![
            "a.example.net",
            "c.example.net",
            "d.example.net",
            "e.example.net",
            "f.example.net",
        ]
    );
}

#[tokio::test]
async fn rotate_without_a_cache_still_produces_a_verdict() {
    let transport = CannedTransport::new(&[
        ("a.example.net", CheckStatus::Ok),
        ("b.example.net", CheckStatus::Ok),
        ("c.example.net", CheckStatus::Ok),
        ("d.example.net", CheckStatus::Ok),
        ("e.example.net", CheckStatus::Ok),
    ]);
    let dispatcher = Dispatcher::new(transport, 3);

    let verdict = dispatcher
        .rotate("svc", None, &five_locations(), &Value::Null)
        .await;
    assert_eq!(verdict.status, CheckStatus::Ok);
}
