//! RPC request signing (signature version 1.0)
//!
//! Every Alidns call is a `GET` whose query string carries the action, its
//! parameters, and a handful of common parameters. The signature covers the
//! sorted, RFC 3986 encoded query:
//!
//! ```text
//! StringToSign = "GET" + "&" + enc("/") + "&" + enc(CanonicalQuery)
//! Signature    = base64(HMAC-SHA1(AccessKeySecret + "&", StringToSign))
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use ddns_core::{Error, Result};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

/// Unreserved characters per RFC 3986 stay as-is; everything else is encoded
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub const API_VERSION: &str = "2015-01-09";
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// Timestamp format expected by the API (ISO 8601, UTC, seconds)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// RFC 3986 percent-encoding (space becomes `%20`, `~` is kept)
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

/// Parameters every request carries besides the action's own
pub fn common_params(
    access_key_id: &str,
    timestamp: DateTime<Utc>,
    nonce: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Format".to_string(), "JSON".to_string()),
        ("Version".to_string(), API_VERSION.to_string()),
        ("AccessKeyId".to_string(), access_key_id.to_string()),
        ("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string()),
        ("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string()),
        ("SignatureNonce".to_string(), nonce.to_string()),
        (
            "Timestamp".to_string(),
            timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ),
    ])
}

/// A fresh nonce; the API rejects a nonce it has seen within 15 minutes
pub fn nonce() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{:016x}{:016x}", fastrand::u64(..), nanos)
}

/// Encoded `key=value` pairs joined by `&`, ordered by key
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(canonical_query: &str) -> String {
    format!(
        "GET&{}&{}",
        percent_encode("/"),
        percent_encode(canonical_query)
    )
}

/// base64(HMAC-SHA1(secret + "&", string_to_sign))
pub fn sign(access_key_secret: &str, string_to_sign: &str) -> Result<String> {
    let key = format!("{}&", access_key_secret);
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Other(format!("Failed to initialise HMAC: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Canonical query with the signature appended, ready to follow `?`
pub fn signed_query(params: &BTreeMap<String, String>, access_key_secret: &str) -> Result<String> {
    let canonical = canonical_query(params);
    let signature = sign(access_key_secret, &string_to_sign(&canonical))?;
    Ok(format!(
        "{}&Signature={}",
        canonical,
        percent_encode(&signature)
    ))
}
