//! Test doubles and common utilities for sync loop contract tests
//!
//! The doubles are scriptable from the test body while the engine owns them:
//! every double is `Clone` and clones share their script and counters.

#![allow(dead_code)]

use ddns_core::config::DdnsConfig;
use ddns_core::error::{Error, Result};
use ddns_core::traits::{AddressSource, DnsProvider, RecordTarget, UpsertOutcome};
use ddns_core::EngineSettings;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure kinds the doubles can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Authentication,
    RateLimited,
    Transient,
    Conflict,
    InvalidDomain,
    InterfaceNotFound,
    NoAddress,
}

impl Failure {
    pub fn to_error(self) -> Error {
        match self {
            Failure::Authentication => Error::auth("InvalidAccessKeyId.NotFound"),
            Failure::RateLimited => Error::rate_limited("Throttling.User"),
            Failure::Transient => Error::transient("connection reset"),
            Failure::Conflict => Error::conflict("DomainRecordConflict"),
            Failure::InvalidDomain => Error::invalid_domain("IncorrectDomainUser"),
            Failure::InterfaceNotFound => Error::interface_not_found("scripted"),
            Failure::NoAddress => Error::no_address("scripted"),
        }
    }
}

/// What the scripted source answers for one interface
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Address(Ipv6Addr),
    Fail(Failure),
    /// Never completes (exercises the call timeout)
    Hang,
}

/// An AddressSource whose answers are set by the test
#[derive(Clone, Default)]
pub struct ScriptedAddressSource {
    answers: Arc<Mutex<HashMap<String, Answer>>>,
    read_count: Arc<AtomicUsize>,
}

impl ScriptedAddressSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer for `interface`; unset interfaces report InterfaceNotFound
    pub fn set(&self, interface: &str, answer: Answer) {
        self.answers
            .lock()
            .unwrap()
            .insert(interface.to_string(), answer);
    }

    pub fn set_address(&self, interface: &str, address: &str) {
        self.set(interface, Answer::Address(address.parse().unwrap()));
    }

    /// Get the number of times read() was called
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressSource for ScriptedAddressSource {
    async fn read(&self, interface: &str) -> Result<Ipv6Addr> {
        self.read_count.fetch_add(1, Ordering::SeqCst);

        let answer = self.answers.lock().unwrap().get(interface).copied();
        match answer {
            Some(Answer::Address(address)) => Ok(address),
            Some(Answer::Fail(failure)) => Err(failure.to_error()),
            Some(Answer::Hang) => std::future::pending().await,
            None => Err(Error::interface_not_found(interface)),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// One upsert call as seen by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertCall {
    pub domain: String,
    pub prefix: String,
    pub record_type: String,
    pub value: Ipv6Addr,
}

impl UpsertCall {
    pub fn new(domain: &str, prefix: &str, record_type: &str, value: &str) -> Self {
        Self {
            domain: domain.to_string(),
            prefix: prefix.to_string(),
            record_type: record_type.to_string(),
            value: value.parse().unwrap(),
        }
    }
}

/// A DnsProvider backed by an in-memory zone that records every call
#[derive(Clone, Default)]
pub struct RecordingProvider {
    /// Every upsert call, in order
    calls: Arc<Mutex<Vec<UpsertCall>>>,
    /// fqdn -> values; a Vec so duplicates would be observable
    zone: Arc<Mutex<HashMap<String, Vec<Ipv6Addr>>>>,
    /// "domain/prefix" -> failure to return
    failures: Arc<Mutex<HashMap<String, Failure>>>,
    /// Delay applied to every upsert
    delay: Arc<Mutex<Option<Duration>>>,
    completed_count: Arc<AtomicUsize>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert of `domain`/`prefix` fail with `failure`
    pub fn fail(&self, domain: &str, prefix: &str, failure: Failure) {
        self.failures
            .lock()
            .unwrap()
            .insert(format!("{}/{}", domain, prefix), failure);
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Delay every upsert by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Calls seen so far
    pub fn calls(&self) -> Vec<UpsertCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the number of upsert calls
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Get the number of upsert calls that ran to completion
    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::SeqCst)
    }

    /// Forget recorded calls (zone contents are kept)
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Values currently held by `fqdn`
    pub fn records(&self, fqdn: &str) -> Vec<Ipv6Addr> {
        self.zone
            .lock()
            .unwrap()
            .get(fqdn)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DnsProvider for RecordingProvider {
    async fn upsert(&self, target: &RecordTarget) -> Result<UpsertOutcome> {
        self.calls.lock().unwrap().push(UpsertCall {
            domain: target.domain.clone(),
            prefix: target.prefix.clone(),
            record_type: target.record_type.to_string(),
            value: target.value,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get(&format!("{}/{}", target.domain, target.prefix))
            .copied();
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }

        self.completed_count.fetch_add(1, Ordering::SeqCst);

        let mut zone = self.zone.lock().unwrap();
        let values = zone.entry(target.fqdn()).or_default();
        let outcome = match values.first().copied() {
            None => {
                values.push(target.value);
                UpsertOutcome::Created
            }
            Some(existing) if existing == target.value => UpsertOutcome::Unchanged,
            Some(existing) => {
                values[0] = target.value;
                UpsertOutcome::Updated {
                    previous: existing.to_string(),
                }
            }
        };
        Ok(outcome)
    }

    async fn verify_credentials(&self) -> Result<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Helper to create a valid DdnsConfig for testing
pub fn config_with(mappings: &[(&str, &str)], prefixes: &[&str]) -> DdnsConfig {
    let mut config = DdnsConfig::from_toml_str(
        r#"
[credentials]
access_key_id = "test-id"
access_key_secret = "test-secret"
"#,
    )
    .unwrap();

    for (interface, domain) in mappings {
        config
            .domain_map
            .insert(interface.to_string(), domain.to_string());
    }
    config.dns.record_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
    config
}

/// Short timings so loop tests finish quickly
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        interval: Duration::from_millis(50),
        call_timeout: Duration::from_millis(200),
        shutdown_grace: Duration::from_millis(100),
        event_channel_capacity: 256,
    }
}

pub fn ip(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}
