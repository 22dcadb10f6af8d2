//! Sync loop
//!
//! The SyncEngine is responsible for:
//! - Reading each configured interface's address via AddressSource
//! - Asking LastKnownState whether the address changed
//! - Upserting every configured record prefix via DnsProvider
//! - Committing the address only after all upserts succeeded
//!
//! ## Architecture
//!
//! ```text
//!   interval tick
//!        │
//!        ▼
//! ┌──────────────┐  read(iface)   ┌───────────────┐
//! │  SyncEngine  │───────────────▶│ AddressSource │
//! └──────────────┘                └───────────────┘
//!        │
//!        ├── should_update? ──▶ LastKnownState
//!        │
//!        ├── upsert(prefix) ──▶ DnsProvider      (once per prefix)
//!        │
//!        └── commit ─────────▶ LastKnownState   (only if every prefix succeeded)
//! ```
//!
//! ## States
//!
//! `Idle` waits for the next timer tick or a shutdown request. `Syncing`
//! runs [`SyncEngine::sync_once`] to completion. Ticks never overlap: the
//! engine holds `&mut self` for the whole tick.

use crate::config::{DdnsConfig, RecordType, SyncConfig};
use crate::error::{Error, Result, Severity};
use crate::state::LastKnownState;
use crate::traits::{AddressSource, DnsProvider, RecordTarget, UpsertOutcome};
use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        mappings_count: usize,
    },

    /// Address could not be read; interface skipped this tick
    AddressUnavailable {
        interface: String,
        error: String,
    },

    /// Address matches the last synced one; no provider calls made
    AddressUnchanged {
        interface: String,
        address: Ipv6Addr,
    },

    /// One record upsert succeeded
    RecordSynced {
        interface: String,
        fqdn: String,
        address: Ipv6Addr,
        outcome: UpsertOutcome,
    },

    /// One record upsert failed
    RecordFailed {
        interface: String,
        fqdn: String,
        error_kind: &'static str,
        error: String,
    },

    /// All upserts for an interface succeeded and the address was committed
    StateCommitted {
        interface: String,
        address: Ipv6Addr,
    },

    /// Provider rejected the domain; mapping skipped for the rest of the run
    MappingDisabled {
        interface: String,
        domain: String,
        error: String,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Timing knobs for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Time between ticks
    pub interval: Duration,
    /// Upper bound for a single address read or upsert
    pub call_timeout: Duration,
    /// How long an in-flight tick may continue after shutdown is requested
    pub shutdown_grace: Duration,
    /// Capacity of the event channel
    ///
    /// When full, new events are dropped with a warning.
    pub event_channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for EngineSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            event_channel_capacity: 256,
        }
    }
}

/// One interface -> domain pair from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMapping {
    pub interface: String,
    pub domain: String,
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Interfaces whose new address was committed
    pub committed: Vec<(String, Ipv6Addr)>,
    /// Interfaces skipped because the address did not change
    pub unchanged: Vec<String>,
    /// Interfaces skipped because no address could be read
    pub unavailable: Vec<String>,
    /// Record names whose upsert failed
    pub failed: Vec<String>,
    /// Interfaces disabled during this tick
    pub disabled: Vec<String>,
    /// Number of upsert calls issued
    pub upserts: usize,
}

enum TickEnd {
    Completed(Result<TickReport>),
    Drained(Result<TickReport>),
    Abandoned,
}

/// Polling sync loop
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`], passing a cancellation token
/// 3. Cancel the token to stop; the in-flight tick gets a grace period
///
/// [`SyncEngine::sync_once()`] runs a single tick and is what `run` calls
/// on every timer fire.
pub struct SyncEngine {
    /// Address source for reading interface addresses
    source: Box<dyn AddressSource>,

    /// DNS provider for writing records
    provider: Box<dyn DnsProvider>,

    /// Interface -> domain pairs, in configuration order
    mappings: Vec<DomainMapping>,

    /// Record prefixes to write for every domain
    record_prefixes: Vec<String>,

    /// Record type to write
    record_type: RecordType,

    settings: EngineSettings,

    /// Last confirmed address per interface
    state: LastKnownState,

    /// Interfaces whose domain the provider rejected
    disabled: HashSet<String>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine with settings taken from `config.sync`
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn AddressSource>,
        provider: Box<dyn DnsProvider>,
        config: &DdnsConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let settings = EngineSettings::from(&config.sync);
        Self::with_settings(source, provider, config, settings)
    }

    /// Create a new sync engine with explicit timing settings
    pub fn with_settings(
        source: Box<dyn AddressSource>,
        provider: Box<dyn DnsProvider>,
        config: &DdnsConfig,
        settings: EngineSettings,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        if settings.interval.is_zero() || settings.call_timeout.is_zero() {
            return Err(Error::config("Engine interval and call timeout must be non-zero"));
        }
        if settings.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }

        let (tx, rx) = mpsc::channel(settings.event_channel_capacity);

        let mappings = config
            .domain_map
            .iter()
            .map(|(interface, domain)| DomainMapping {
                interface: interface.clone(),
                domain: domain.clone(),
            })
            .collect();

        let engine = Self {
            source,
            provider,
            mappings,
            record_prefixes: config.dns.record_prefixes.clone(),
            record_type: config.dns.record_type,
            settings,
            state: LastKnownState::new(),
            disabled: HashSet::new(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Last-known state (read-only)
    pub fn state(&self) -> &LastKnownState {
        &self.state
    }

    /// Configured mappings
    pub fn mappings(&self) -> &[DomainMapping] {
        &self.mappings
    }

    /// Whether the mapping for `interface` was disabled
    pub fn is_disabled(&self, interface: &str) -> bool {
        self.disabled.contains(interface)
    }

    /// Run the sync loop until `shutdown` is cancelled
    ///
    /// The first tick fires immediately. Missed ticks are delayed, not
    /// bursted.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error (e.g. credentials rejected)
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            mappings = self.mappings.len(),
            prefixes = ?self.record_prefixes,
            record_type = %self.record_type,
            interval = ?self.settings.interval,
            provider = self.provider.provider_name(),
            source = self.source.source_name(),
            "Sync engine started"
        );
        self.emit_event(EngineEvent::Started {
            mappings_count: self.mappings.len(),
        });

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Idle
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    return Ok(());
                }

                _ = ticker.tick() => {}
            }

            // Syncing
            let grace = self.settings.shutdown_grace;
            let end = {
                let tick = self.sync_once();
                tokio::pin!(tick);

                tokio::select! {
                    biased;

                    result = &mut tick => TickEnd::Completed(result),

                    _ = shutdown.cancelled() => {
                        match tokio::time::timeout(grace, &mut tick).await {
                            Ok(result) => TickEnd::Drained(result),
                            Err(_) => TickEnd::Abandoned,
                        }
                    }
                }
            };

            match end {
                TickEnd::Completed(Ok(report)) => {
                    debug!(
                        committed = report.committed.len(),
                        unchanged = report.unchanged.len(),
                        unavailable = report.unavailable.len(),
                        failed = report.failed.len(),
                        upserts = report.upserts,
                        "Tick finished"
                    );
                }
                TickEnd::Drained(Ok(_)) => {
                    info!("Shutdown signal received, in-flight tick finished");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    return Ok(());
                }
                TickEnd::Abandoned => {
                    warn!(
                        grace = ?grace,
                        "Shutdown signal received, in-flight tick abandoned after grace period"
                    );
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal (tick abandoned)".to_string(),
                    });
                    return Ok(());
                }
                TickEnd::Completed(Err(e)) | TickEnd::Drained(Err(e)) => {
                    error!(error_kind = e.kind(), error = %e, "Fatal error, stopping sync engine");
                    self.emit_event(EngineEvent::Stopped {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
    }

    /// Run one tick over every mapping
    ///
    /// Per-interface and per-record failures are logged and reported; only
    /// fatal errors are returned, and they abandon the rest of the tick.
    pub async fn sync_once(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mappings = self.mappings.clone();

        for mapping in &mappings {
            if self.disabled.contains(&mapping.interface) {
                debug!(
                    interface = %mapping.interface,
                    domain = %mapping.domain,
                    "Mapping is disabled, skipping"
                );
                continue;
            }

            let address = match self.read_address(&mapping.interface).await {
                Ok(address) => address,
                Err(e) => {
                    warn!(
                        interface = %mapping.interface,
                        domain = %mapping.domain,
                        error_kind = e.kind(),
                        error = %e,
                        "No publishable address, skipping this tick"
                    );
                    self.emit_event(EngineEvent::AddressUnavailable {
                        interface: mapping.interface.clone(),
                        error: e.to_string(),
                    });
                    report.unavailable.push(mapping.interface.clone());
                    continue;
                }
            };

            if !self.state.should_update(&mapping.interface, address) {
                debug!(
                    interface = %mapping.interface,
                    address = %address,
                    "Address unchanged, skipping update"
                );
                self.emit_event(EngineEvent::AddressUnchanged {
                    interface: mapping.interface.clone(),
                    address,
                });
                report.unchanged.push(mapping.interface.clone());
                continue;
            }

            info!(
                interface = %mapping.interface,
                domain = %mapping.domain,
                address = %address,
                previous = ?self.state.last_address(&mapping.interface),
                "Address changed, updating records"
            );

            if self.sync_mapping(mapping, address, &mut report).await? {
                self.state.commit(&mapping.interface, address);
                info!(
                    interface = %mapping.interface,
                    address = %address,
                    "All records updated, state committed"
                );
                self.emit_event(EngineEvent::StateCommitted {
                    interface: mapping.interface.clone(),
                    address,
                });
                report.committed.push((mapping.interface.clone(), address));
            }
        }

        Ok(report)
    }

    /// Upsert every prefix of one mapping
    ///
    /// Returns whether all upserts succeeded.
    async fn sync_mapping(
        &mut self,
        mapping: &DomainMapping,
        address: Ipv6Addr,
        report: &mut TickReport,
    ) -> Result<bool> {
        let mut all_succeeded = true;
        let prefixes = self.record_prefixes.clone();

        for prefix in prefixes {
            let target = RecordTarget::new(&mapping.domain, prefix, self.record_type, address);
            report.upserts += 1;

            match self.upsert(&target).await {
                Ok(outcome) => {
                    match &outcome {
                        UpsertOutcome::Created => {
                            info!(interface = %mapping.interface, record = %target, "Created record")
                        }
                        UpsertOutcome::Updated { previous } => info!(
                            interface = %mapping.interface,
                            record = %target,
                            previous = %previous,
                            "Updated record"
                        ),
                        UpsertOutcome::Unchanged => debug!(
                            interface = %mapping.interface,
                            record = %target,
                            "Record already up to date"
                        ),
                    }
                    self.emit_event(EngineEvent::RecordSynced {
                        interface: mapping.interface.clone(),
                        fqdn: target.fqdn(),
                        address,
                        outcome,
                    });
                }
                Err(e) => {
                    report.failed.push(target.fqdn());
                    self.emit_event(EngineEvent::RecordFailed {
                        interface: mapping.interface.clone(),
                        fqdn: target.fqdn(),
                        error_kind: e.kind(),
                        error: e.to_string(),
                    });

                    match e.severity() {
                        Severity::Fatal => {
                            error!(
                                interface = %mapping.interface,
                                domain = %mapping.domain,
                                prefix = %target.prefix,
                                error_kind = e.kind(),
                                error = %e,
                                "Fatal provider error"
                            );
                            return Err(e);
                        }
                        Severity::SkipMapping => {
                            error!(
                                interface = %mapping.interface,
                                domain = %mapping.domain,
                                prefix = %target.prefix,
                                error_kind = e.kind(),
                                error = %e,
                                "Provider rejected domain, disabling mapping"
                            );
                            self.disabled.insert(mapping.interface.clone());
                            self.emit_event(EngineEvent::MappingDisabled {
                                interface: mapping.interface.clone(),
                                domain: mapping.domain.clone(),
                                error: e.to_string(),
                            });
                            report.disabled.push(mapping.interface.clone());
                            return Ok(false);
                        }
                        Severity::Retry => {
                            warn!(
                                interface = %mapping.interface,
                                domain = %mapping.domain,
                                prefix = %target.prefix,
                                error_kind = e.kind(),
                                error = %e,
                                "Record update failed, will retry next tick"
                            );
                            all_succeeded = false;
                        }
                    }
                }
            }
        }

        Ok(all_succeeded)
    }

    /// Read an address, bounded by the call timeout
    async fn read_address(&self, interface: &str) -> Result<Ipv6Addr> {
        match tokio::time::timeout(self.settings.call_timeout, self.source.read(interface)).await {
            Ok(result) => result,
            Err(_) => Err(Error::transient(format!(
                "reading address of {} timed out after {:?}",
                interface, self.settings.call_timeout
            ))),
        }
    }

    /// Upsert one record, bounded by the call timeout
    async fn upsert(&self, target: &RecordTarget) -> Result<UpsertOutcome> {
        match tokio::time::timeout(self.settings.call_timeout, self.provider.upsert(target)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::transient(format!(
                "upsert of {} timed out after {:?}",
                target.fqdn(),
                self.settings.call_timeout
            ))),
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider draining events faster.");
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
