//! Configuration types for the DDNS system
//!
//! The configuration is a TOML document loaded once at startup. Credentials
//! may also come from the environment, which takes precedence over the file.
//! The environment can carry the whole configuration: `DOMAIN_MAP_<IFACE>`
//! variables add mappings, and `DNS_RECORD_PREFIXES` / `DNS_RECORD_TYPE`
//! replace the record settings.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding `credentials.access_key_id`
pub const ENV_ACCESS_KEY_ID: &str = "ALIYUN_ACCESS_KEY_ID";

/// Environment variable overriding `credentials.access_key_secret`
pub const ENV_ACCESS_KEY_SECRET: &str = "ALIYUN_ACCESS_KEY_SECRET";

/// Environment variable overriding `log_level`
pub const ENV_LOG_LEVEL: &str = "DDNS_LOG_LEVEL";

/// Environment variable prefix adding `interface = domain` mappings
///
/// `DOMAIN_MAP_ETH0=home.example.com` maps `eth0`.
pub const ENV_DOMAIN_MAP_PREFIX: &str = "DOMAIN_MAP_";

/// Environment variable replacing `dns.record_prefixes` (comma separated)
pub const ENV_RECORD_PREFIXES: &str = "DNS_RECORD_PREFIXES";

/// Environment variable replacing `dns.record_type`
pub const ENV_RECORD_TYPE: &str = "DNS_RECORD_TYPE";

/// Set to `true` by the systemd unit; moves the log file under /var/log
pub const ENV_RUNNING_IN_SYSTEMD: &str = "RUNNING_IN_SYSTEMD";

/// Log directory used under systemd when `log_dir` is not configured
pub const SYSTEMD_LOG_DIR: &str = "/var/log/ddnsd";

/// Main DDNS configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DdnsConfig {
    /// Provider credentials
    #[serde(default)]
    pub credentials: Credentials,

    /// Interface name -> domain name
    ///
    /// A `BTreeMap` so every tick walks the mappings in the same order.
    #[serde(default)]
    pub domain_map: BTreeMap<String, String>,

    /// DNS record settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Sync loop settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the daily log file; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl DdnsConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&text)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        // Non-UTF-8 variables cannot name any of ours
        self.apply_env_from(
            std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
        )
    }

    /// Apply overrides from an arbitrary set of variables
    ///
    /// Empty values are ignored. Fails only on an unknown `DNS_RECORD_TYPE`.
    pub fn apply_env_from<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        if let Some(id) = vars.get(ENV_ACCESS_KEY_ID) {
            self.credentials.access_key_id = id.clone();
        }
        if let Some(secret) = vars.get(ENV_ACCESS_KEY_SECRET) {
            self.credentials.access_key_secret = secret.clone();
        }
        if let Some(level) = vars.get(ENV_LOG_LEVEL) {
            self.log_level = level.clone();
        }

        for (key, domain) in &vars {
            if let Some(interface) = key.strip_prefix(ENV_DOMAIN_MAP_PREFIX) {
                self.domain_map
                    .insert(interface.to_lowercase(), domain.trim().to_string());
            }
        }

        if let Some(prefixes) = vars.get(ENV_RECORD_PREFIXES) {
            self.dns.record_prefixes = prefixes
                .split(',')
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(record_type) = vars.get(ENV_RECORD_TYPE) {
            self.dns.record_type = record_type.parse()?;
        }

        if self.log_dir.is_none()
            && vars.get(ENV_RUNNING_IN_SYSTEMD).map(String::as_str) == Some("true")
        {
            self.log_dir = Some(PathBuf::from(SYSTEMD_LOG_DIR));
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;

        if self.domain_map.is_empty() {
            return Err(Error::config(
                "domain_map must contain at least one interface = \"domain\" entry",
            ));
        }

        for (interface, domain) in &self.domain_map {
            validate_interface_name(interface)?;
            validate_domain_name(domain)?;
        }

        self.dns.validate()?;
        self.sync.validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(Error::config(format!(
                "log_level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                self.log_level
            ))),
        }
    }
}

/// Provider credentials
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    /// Access key id
    #[serde(default)]
    pub access_key_id: String,

    /// Access key secret
    /// ⚠️ NEVER log this value
    #[serde(default)]
    pub access_key_secret: String,
}

impl Credentials {
    /// Create credentials from an id/secret pair
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.access_key_id.trim().is_empty() {
            return Err(Error::config(format!(
                "credentials.access_key_id is required (or set {})",
                ENV_ACCESS_KEY_ID
            )));
        }
        if self.access_key_secret.trim().is_empty() {
            return Err(Error::config(format!(
                "credentials.access_key_secret is required (or set {})",
                ENV_ACCESS_KEY_SECRET
            )));
        }
        Ok(())
    }
}

// Custom Debug implementation that hides the secret
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .finish()
    }
}

/// DNS record type
///
/// Only AAAA records are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum RecordType {
    /// AAAA record (IPv6)
    #[default]
    #[serde(rename = "AAAA", alias = "aaaa")]
    Aaaa,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "AAAA" | "aaaa" => Ok(RecordType::Aaaa),
            other => Err(Error::config(format!(
                "Record type '{}' is not supported; only AAAA records are managed",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DNS record settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsConfig {
    /// Record prefixes to keep in sync, in order ("@" is the bare domain)
    #[serde(default = "default_record_prefixes")]
    pub record_prefixes: Vec<String>,

    /// Record type to write
    #[serde(default)]
    pub record_type: RecordType,

    /// Provider API endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP timeout for a single provider request (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Perform lookups but skip writes
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            record_prefixes: default_record_prefixes(),
            record_type: RecordType::default(),
            endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
            dry_run: false,
        }
    }
}

impl DnsConfig {
    fn validate(&self) -> Result<()> {
        if self.record_prefixes.is_empty() {
            return Err(Error::config("dns.record_prefixes must not be empty"));
        }

        for prefix in &self.record_prefixes {
            validate_record_prefix(prefix)?;
        }

        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                return Err(Error::config(format!(
                    "dns.endpoint must use HTTP or HTTPS scheme. Got: {}",
                    endpoint
                )));
            }
        }

        if !(1..=300).contains(&self.request_timeout_secs) {
            return Err(Error::config(format!(
                "dns.request_timeout_secs must be between 1 and 300. Got: {}",
                self.request_timeout_secs
            )));
        }

        Ok(())
    }

    /// HTTP timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Sync loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Polling interval (in seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for one address read or one upsert (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// How long an in-flight tick may run after a shutdown request (in seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl SyncConfig {
    fn validate(&self) -> Result<()> {
        if !(10..=86_400).contains(&self.interval_secs) {
            return Err(Error::config(format!(
                "sync.interval_secs must be between 10 and 86400 seconds. Got: {}",
                self.interval_secs
            )));
        }
        if !(1..=600).contains(&self.call_timeout_secs) {
            return Err(Error::config(format!(
                "sync.call_timeout_secs must be between 1 and 600 seconds. Got: {}",
                self.call_timeout_secs
            )));
        }
        if self.shutdown_grace_secs > 300 {
            return Err(Error::config(format!(
                "sync.shutdown_grace_secs must be at most 300 seconds. Got: {}",
                self.shutdown_grace_secs
            )));
        }
        Ok(())
    }
}

fn default_record_prefixes() -> Vec<String> {
    vec!["@".to_string(), "*".to_string(), "www".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    300
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Validate a local interface name
///
/// Linux caps names at IFNAMSIZ - 1 = 15 bytes and forbids '/' and whitespace.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 15 {
        return Err(Error::config(format!(
            "Interface name must be 1-15 characters. Got: '{}'",
            name
        )));
    }

    if name
        .chars()
        .any(|c| c == '/' || c == ':' || c.is_whitespace() || c.is_control())
    {
        return Err(Error::config(format!(
            "Interface name contains invalid characters: '{}'",
            name
        )));
    }

    Ok(())
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; not comprehensive but catches common errors.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("Domain name cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(Error::config(format!(
            "Domain name must have at least two labels. Got: '{}'",
            domain
        )));
    }

    for label in domain.split('.') {
        validate_label(label, domain)?;
    }

    Ok(())
}

/// Validate a record prefix ("@", "*", "www", "*.lab", "_acme", ...)
pub fn validate_record_prefix(prefix: &str) -> Result<()> {
    if prefix == "@" || prefix == "*" {
        return Ok(());
    }

    if prefix.is_empty() {
        return Err(Error::config("Record prefix cannot be empty (use \"@\" for the bare domain)"));
    }

    for (i, label) in prefix.split('.').enumerate() {
        if i == 0 && label == "*" {
            continue;
        }
        let inner = label.strip_prefix('_').unwrap_or(label);
        validate_label(inner, prefix)?;
    }

    Ok(())
}

fn validate_label(label: &str, whole: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::config(format!("Name has empty label: '{}'", whole)));
    }

    if label.len() > 63 {
        return Err(Error::config(format!(
            "Label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        )));
    }

    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::config(format!(
            "Label contains invalid characters. Label: '{}'. \
            Valid: alphanumeric and hyphen only.",
            label
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(Error::config(format!(
            "Label cannot start or end with hyphen. Label: '{}'",
            label
        )));
    }

    Ok(())
}
