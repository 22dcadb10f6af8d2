// # Aliyun DNS Provider
//
// This crate provides an Alidns (Alibaba Cloud DNS) provider implementation
// for the DDNS system.
//
// ## Behavior
//
// - One upsert = one lookup plus at most one write
// - Full error propagation to the sync loop (which owns retry scheduling)
// - HTTP timeout on every request
// - Dry-run mode: lookups run, writes are only logged
// - No retry, backoff, caching or background tasks
//
// ## Security Requirements
//
// - The AccessKey secret NEVER appears in logs, errors or `Debug` output
// - Request URLs are never logged (they carry the AccessKey id and signature)
//
// ## API Reference
//
// All actions are RPC-style `GET https://alidns.aliyuncs.com/?Action=...`
// calls signed per request (see [`signature`]).
//
// - DescribeDomainRecords: list records by `DomainName`, `RRKeyWord`, `Type`
// - AddDomainRecord: `DomainName`, `RR`, `Type`, `Value`
// - UpdateDomainRecord: `RecordId`, `RR`, `Type`, `Value`
// - DescribeDomains: used to check credentials at startup

pub mod api;
pub mod signature;

use async_trait::async_trait;
use chrono::Utc;
use ddns_core::config::{Credentials, DdnsConfig};
use ddns_core::traits::{DnsProvider, RecordTarget, UpsertOutcome};
use ddns_core::{Error, Result};
use serde::de::DeserializeOwned;
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::{debug, info, warn};

use api::{
    CallError, DescribeDomainRecordsResponse, DescribeDomainsResponse, Record, ServiceError,
    WriteRecordResponse,
};

/// Public Alidns endpoint
pub const ALIYUN_DNS_ENDPOINT: &str = "https://alidns.aliyuncs.com";

/// Name used in logs and `Error::Provider`
pub const PROVIDER_NAME: &str = "aliyun";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest page DescribeDomainRecords accepts
const PAGE_SIZE: &str = "500";

/// Aliyun DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is isolated, stateless, and single-shot. All coordination
/// (retries, scheduling, last-known state) is owned by `SyncEngine`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform DescribeDomainRecords lookups
/// - Log the Add/Update call it would make
/// - **NOT** actually modify DNS records
pub struct AliyunProvider {
    access_key_id: String,

    /// ⚠️ NEVER log this value
    access_key_secret: String,

    /// API endpoint without trailing slash
    endpoint: String,

    client: reqwest::Client,

    dry_run: bool,
}

// Custom Debug implementation that hides the secret
impl std::fmt::Debug for AliyunProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliyunProvider")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl AliyunProvider {
    /// Create a new Aliyun provider
    ///
    /// # Parameters
    ///
    /// - `credentials`: AccessKey pair with Alidns read/write permission
    /// - `endpoint`: API endpoint (`None` for [`ALIYUN_DNS_ENDPOINT`])
    /// - `timeout`: HTTP timeout per request
    /// - `dry_run`: If true, perform lookups but skip writes
    pub fn new(
        credentials: &Credentials,
        endpoint: Option<&str>,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<Self> {
        if credentials.access_key_id.is_empty() || credentials.access_key_secret.is_empty() {
            return Err(Error::config("Aliyun AccessKey id and secret are required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            access_key_id: credentials.access_key_id.clone(),
            access_key_secret: credentials.access_key_secret.clone(),
            endpoint: endpoint
                .unwrap_or(ALIYUN_DNS_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            client,
            dry_run,
        })
    }

    /// Create a provider from the validated configuration
    pub fn from_config(config: &DdnsConfig) -> Result<Self> {
        if config.dns.dry_run {
            warn!("Aliyun provider running in DRY-RUN mode - no changes will be made");
        }

        Self::new(
            &config.credentials,
            config.dns.endpoint.as_deref(),
            config.dns.request_timeout(),
            config.dns.dry_run,
        )
    }

    /// Create a provider with the default endpoint and timeout
    pub fn with_defaults(credentials: &Credentials) -> Result<Self> {
        Self::new(credentials, None, DEFAULT_HTTP_TIMEOUT, false)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Sign and send one RPC call, decoding a successful body as `T`
    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<T, CallError> {
        let mut query =
            signature::common_params(&self.access_key_id, Utc::now(), &signature::nonce());
        query.insert("Action".to_string(), action.to_string());
        for (key, value) in params {
            query.insert(key.to_string(), value.to_string());
        }

        let signed = signature::signed_query(&query, &self.access_key_secret)
            .map_err(CallError::Local)?;
        let url = format!("{}/?{}", self.endpoint, signed);

        debug!(action = action, "Calling Alidns API");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CallError::Local(transport_error(action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallError::Local(transport_error(action, e)))?;

        if !status.is_success() {
            let service = ServiceError::from_body(status.as_u16(), &body);
            debug!(
                action = action,
                status = status.as_u16(),
                code = %service.code,
                "Alidns API returned an error"
            );
            return Err(CallError::Service(service));
        }

        serde_json::from_str(&body).map_err(|e| {
            CallError::Local(Error::provider(
                PROVIDER_NAME,
                format!("Failed to parse {} response: {}", action, e),
            ))
        })
    }

    /// Find the record matching the target's prefix and type exactly
    ///
    /// `RRKeyWord` is a fuzzy filter, so the listing is narrowed here.
    async fn find_record(&self, target: &RecordTarget) -> Result<Option<Record>> {
        let record_type = target.record_type.as_str();
        let response: DescribeDomainRecordsResponse = self
            .call(
                "DescribeDomainRecords",
                &[
                    ("DomainName", target.domain.as_str()),
                    ("RRKeyWord", target.prefix.as_str()),
                    ("Type", record_type),
                    ("PageSize", PAGE_SIZE),
                ],
            )
            .await?;

        let mut matches = response
            .domain_records
            .record
            .into_iter()
            .filter(|r| r.rr == target.prefix && r.record_type.eq_ignore_ascii_case(record_type));

        let found = matches.next();
        if found.is_some() && matches.next().is_some() {
            warn!(
                domain = %target.domain,
                prefix = %target.prefix,
                "Multiple records match; updating the first one"
            );
        }

        Ok(found)
    }

    async fn add_record(&self, target: &RecordTarget) -> Result<UpsertOutcome> {
        let value = target.value.to_string();

        if self.dry_run {
            info!(
                record = %target,
                "[DRY-RUN] Would call AddDomainRecord"
            );
            return Ok(UpsertOutcome::Created);
        }

        let result: std::result::Result<WriteRecordResponse, CallError> = self
            .call(
                "AddDomainRecord",
                &[
                    ("DomainName", target.domain.as_str()),
                    ("RR", target.prefix.as_str()),
                    ("Type", target.record_type.as_str()),
                    ("Value", value.as_str()),
                ],
            )
            .await;

        match result {
            Ok(response) => {
                debug!(
                    record = %target,
                    record_id = ?response.record_id,
                    "AddDomainRecord succeeded"
                );
                Ok(UpsertOutcome::Created)
            }
            Err(CallError::Service(service)) if service.is_duplicate() => {
                debug!(record = %target, "Record already exists with this value");
                Ok(UpsertOutcome::Unchanged)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_record(&self, existing: &Record, target: &RecordTarget) -> Result<UpsertOutcome> {
        let value = target.value.to_string();
        let outcome = UpsertOutcome::Updated {
            previous: existing.value.clone(),
        };

        if self.dry_run {
            info!(
                record = %target,
                record_id = %existing.record_id,
                previous = %existing.value,
                "[DRY-RUN] Would call UpdateDomainRecord"
            );
            return Ok(outcome);
        }

        let result: std::result::Result<WriteRecordResponse, CallError> = self
            .call(
                "UpdateDomainRecord",
                &[
                    ("RecordId", existing.record_id.as_str()),
                    ("RR", target.prefix.as_str()),
                    ("Type", target.record_type.as_str()),
                    ("Value", value.as_str()),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(outcome),
            Err(CallError::Service(service)) if service.is_duplicate() => {
                debug!(record = %target, "Record already holds this value");
                Ok(UpsertOutcome::Unchanged)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DnsProvider for AliyunProvider {
    /// Create or overwrite one record
    ///
    /// # API Calls
    ///
    /// ```http
    /// GET /?Action=DescribeDomainRecords&DomainName=..&RRKeyWord=..&Type=AAAA
    ///
    /// # absent
    /// GET /?Action=AddDomainRecord&DomainName=..&RR=..&Type=AAAA&Value=..
    ///
    /// # present with another value
    /// GET /?Action=UpdateDomainRecord&RecordId=..&RR=..&Type=AAAA&Value=..
    /// ```
    async fn upsert(&self, target: &RecordTarget) -> Result<UpsertOutcome> {
        debug!(
            record = %target,
            mode = if self.dry_run { "DRY-RUN" } else { "LIVE" },
            "Upserting Alidns record"
        );

        match self.find_record(target).await? {
            None => self.add_record(target).await,
            Some(existing) if holds_value(&existing, target.value) => {
                debug!(
                    record = %target,
                    record_id = %existing.record_id,
                    "Record already has the correct value"
                );
                Ok(UpsertOutcome::Unchanged)
            }
            Some(existing) => self.update_record(&existing, target).await,
        }
    }

    async fn verify_credentials(&self) -> Result<()> {
        let response: DescribeDomainsResponse = self
            .call("DescribeDomains", &[("PageSize", "1")])
            .await?;

        debug!(
            domains = ?response.total_count,
            "Aliyun credentials accepted"
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Compare addresses, not strings ("2001:DB8::1" equals "2001:db8::1")
fn holds_value(record: &Record, value: Ipv6Addr) -> bool {
    record
        .value
        .parse::<Ipv6Addr>()
        .is_ok_and(|current| current == value)
}

fn transport_error(action: &str, err: reqwest::Error) -> Error {
    // The URL carries the signature; keep it out of the message
    let err = err.without_url();
    if err.is_timeout() {
        Error::transient(format!("{} timed out: {}", action, err))
    } else {
        Error::transient(format!("{} request failed: {}", action, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("LTAI5tExample", "super-secret-value")
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let err = AliyunProvider::with_defaults(&Credentials::new("", "secret")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = AliyunProvider::with_defaults(&Credentials::new("id", "")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn secret_not_exposed_in_debug() {
        let provider = AliyunProvider::with_defaults(&credentials()).unwrap();
        let debug_str = format!("{:?}", provider);

        assert!(!debug_str.contains("super-secret-value"));
        assert!(debug_str.contains("<REDACTED>"));
        assert!(debug_str.contains("AliyunProvider"));
    }

    #[test]
    fn endpoint_defaults_and_trims() {
        let provider = AliyunProvider::with_defaults(&credentials()).unwrap();
        assert_eq!(provider.endpoint, ALIYUN_DNS_ENDPOINT);

        let provider = AliyunProvider::new(
            &credentials(),
            Some("http://127.0.0.1:8080/"),
            DEFAULT_HTTP_TIMEOUT,
            true,
        )
        .unwrap();
        assert_eq!(provider.endpoint, "http://127.0.0.1:8080");
        assert!(provider.is_dry_run());
    }

    #[test]
    fn value_comparison_is_semantic() {
        let record = Record {
            record_id: "1".to_string(),
            rr: "@".to_string(),
            record_type: "AAAA".to_string(),
            value: "2001:DB8:0:0::1".to_string(),
            status: None,
            ttl: None,
        };
        assert!(holds_value(&record, "2001:db8::1".parse().unwrap()));
        assert!(!holds_value(&record, "2001:db8::2".parse().unwrap()));
    }

    #[test]
    fn test_provider_name() {
        let provider = AliyunProvider::with_defaults(&credentials()).unwrap();
        assert_eq!(provider.provider_name(), "aliyun");
    }
}
