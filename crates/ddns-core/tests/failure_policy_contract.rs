//! Contract Test: Failure Policy
//!
//! This test verifies how far each failure kind reaches.
//!
//! Constraints verified:
//! - AuthenticationFailed stops the loop
//! - InvalidDomain disables only the affected mapping
//! - RateLimited, TransientNetworkError and RecordConflict are retried next tick
//! - A hung address read or upsert is cut off by the call timeout
//!
//! If this test fails, someone has:
//! - Made a per-record failure abort the whole loop
//! - Let a provider failure advance the last-known state
//! - Removed the per-call timeout

mod common;

use common::*;
use ddns_core::{EngineEvent, Error, SyncEngine};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn engine_for(
    source: &ScriptedAddressSource,
    provider: &RecordingProvider,
    mappings: &[(&str, &str)],
    prefixes: &[&str],
) -> (SyncEngine, tokio::sync::mpsc::Receiver<EngineEvent>) {
    SyncEngine::with_settings(
        Box::new(source.clone()),
        Box::new(provider.clone()),
        &config_with(mappings, prefixes),
        fast_settings(),
    )
    .expect("engine construction succeeds")
}

#[tokio::test]
async fn authentication_failure_aborts_tick() {
    let source = ScriptedAddressSource::new();
    let provider = RecordingProvider::new();
    let (mut engine, _events) = engine_for(
        &source,
        &provider,
        &[("eth0", "a.example.com"), ("wlan0", "b.example.com")],
        &["@", "www"],
    );

    source.set_address("eth0", "2001:db8::1");
    source.set_address("wlan0", "2001:db8::2");
    provider.fail("a.example.com", "@", Failure::Authentication);

    let err = assert_err!(engine.sync_once().await);

    assert!(matches!(err, Error::Authentication(_)), "{err:?}");
    assert_eq!(provider.call_count(), 1, "nothing is attempted after a fatal error");
    assert!(engine.state().is_empty());
}

#[tokio::test]
async fn authentication_failure_stops_run() {
    let source = ScriptedAddressSource::new();
    let provider = RecordingProvider::new();
    let (mut engine, mut events) =
        engine_for(&source, &provider, &[("eth0", "a.example.com")], &["@"]);

    source.set_address("eth0", "2001:db8::1");
    provider.fail("a.example.com", "@", Failure::Authentication);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        engine.run(CancellationToken::new()),
    )
    .await
    .expect("run returns without being cancelled");

    assert!(matches!(result, Err(Error::Authentication(_))));

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(EngineEvent::Stopped { .. })));
}

#[tokio::test]
async fn invalid_domain_disables_only_its_mapping() {
    let source = ScriptedAddressSource::new();
    let provider = RecordingProvider::new();
    let (mut engine, _events) = engine_for(
        &source,
        &provider,
        &[("eth0", "a.example.com"), ("wlan0", "b.example.com")],
        &["@", "www"],
    );

    source.set_address("eth0", "2001:db8::1");
    source.set_address("wlan0", "2001:db8::2");
    provider.fail("a.example.com", "@", Failure::InvalidDomain);

    let report = assert_ok!(engine.sync_once().await);

    assert_eq!(report.disabled, vec!["eth0".to_string()]);
    assert!(engine.is_disabled("eth0"));
    assert!(!engine.is_disabled("wlan0"));
    assert_eq!(engine.state().last_address("eth0"), None);
    assert_eq!(engine.state().last_address("wlan0"), Some(ip("2001:db8::2")));
    // a.example.com/@ once, then both prefixes of b.example.com
    assert_eq!(provider.call_count(), 3);

    // Disabled mappings are not even read on later ticks
    provider.reset_calls();
    source.set_address("eth0", "2001:db8::3");
    let reads_before = source.read_count();
    engine.sync_once().await.unwrap();

    assert_eq!(provider.call_count(), 0);
    assert_eq!(source.read_count() - reads_before, 1, "only wlan0 is read");
}

#[tokio::test]
async fn recoverable_provider_failures_retry_next_tick() {
    for failure in [Failure::RateLimited, Failure::Transient, Failure::Conflict] {
        let source = ScriptedAddressSource::new();
        let provider = RecordingProvider::new();
        let (mut engine, _events) =
            engine_for(&source, &provider, &[("eth0", "a.example.com")], &["@"]);

        source.set_address("eth0", "2001:db8::1");
        provider.fail("a.example.com", "@", failure);

        let report = assert_ok!(engine.sync_once().await);
        assert_eq!(report.failed.len(), 1, "{failure:?}");
        assert!(!engine.is_disabled("eth0"), "{failure:?}");
        assert!(engine.state().is_empty(), "{failure:?}");

        provider.heal();
        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.committed.len(), 1, "{failure:?}");
    }
}

#[tokio::test]
async fn hung_address_read_times_out() {
    let source = ScriptedAddressSource::new();
    let provider = RecordingProvider::new();
    let (mut engine, _events) = engine_for(
        &source,
        &provider,
        &[("eth0", "a.example.com"), ("wlan0", "b.example.com")],
        &["@"],
    );

    source.set("eth0", Answer::Hang);
    source.set_address("wlan0", "2001:db8::2");

    let report = tokio::time::timeout(Duration::from_secs(5), engine.sync_once())
        .await
        .expect("call timeout bounds the tick")
        .unwrap();

    assert_eq!(report.unavailable, vec!["eth0".to_string()]);
    assert_eq!(report.committed, vec![("wlan0".to_string(), ip("2001:db8::2"))]);
}

#[tokio::test]
async fn hung_upsert_times_out_as_transient() {
    let source = ScriptedAddressSource::new();
    let provider = RecordingProvider::new();
    let (mut engine, mut events) =
        engine_for(&source, &provider, &[("eth0", "a.example.com")], &["@"]);

    source.set_address("eth0", "2001:db8::1");
    provider.set_delay(Duration::from_secs(30));

    let report = tokio::time::timeout(Duration::from_secs(5), engine.sync_once())
        .await
        .expect("call timeout bounds the tick")
        .unwrap();

    assert_eq!(report.failed, vec!["a.example.com".to_string()]);
    assert!(engine.state().is_empty());

    let failed_kind = std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
        EngineEvent::RecordFailed { error_kind, .. } => Some(error_kind),
        _ => None,
    });
    assert_eq!(failed_kind, Some("TransientNetworkError"));
}
