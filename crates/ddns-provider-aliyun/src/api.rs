// # Alidns API Types
//
// Response bodies for the handful of actions the provider calls, plus the
// error body and its mapping onto `ddns_core::Error`.
//
// ## Error Body
//
// ```json
// {
//   "RequestId": "2F5A5A0B-...",
//   "HostId": "alidns.aliyuncs.com",
//   "Code": "Throttling.User",
//   "Message": "Request was denied due to user flow control.",
//   "Recommend": "https://api.aliyun.com/troubleshoot?..."
// }
// ```

use ddns_core::Error;
use serde::Deserialize;

use crate::PROVIDER_NAME;

/// One DNS record as returned by DescribeDomainRecords
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub record_id: String,
    #[serde(rename = "RR")]
    pub rr: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    pub value: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "TTL", default)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainRecords {
    #[serde(default)]
    pub record: Vec<Record>,
}

/// DescribeDomainRecords response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeDomainRecordsResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub domain_records: DomainRecords,
}

/// AddDomainRecord / UpdateDomainRecord response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WriteRecordResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
}

/// DescribeDomains response (only the count is of interest)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeDomainsResponse {
    #[serde(default)]
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A non-2xx answer from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

impl ServiceError {
    /// Build from the HTTP status and raw body
    ///
    /// Bodies that are not the documented JSON (e.g. a proxy's HTML page)
    /// keep the status and a trimmed copy of the text.
    pub fn from_body(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .unwrap_or_else(|| body.chars().take(200).collect::<String>());

        Self {
            status,
            code: parsed.code.unwrap_or_default(),
            message,
            request_id: parsed.request_id,
        }
    }

    /// The record already exists with the requested value
    pub fn is_duplicate(&self) -> bool {
        self.code == "DomainRecordDuplicate"
    }

    /// Map onto the shared error taxonomy
    pub fn classify(&self) -> Error {
        let detail = match &self.request_id {
            Some(id) => format!(
                "{} (HTTP {}): {} [RequestId {}]",
                self.code, self.status, self.message, id
            ),
            None => format!("{} (HTTP {}): {}", self.code, self.status, self.message),
        };
        let code = self.code.as_str();

        if code.starts_with("InvalidDomainName")
            || code == "IncorrectDomainUser"
            || code.starts_with("DomainForbidden")
            || code.starts_with("InvalidRR")
        {
            return Error::invalid_domain(detail);
        }

        if code.starts_with("InvalidAccessKeyId")
            || code == "SignatureDoesNotMatch"
            || code == "IncompleteSignature"
            || code.starts_with("Forbidden")
        {
            return Error::auth(detail);
        }

        if code.starts_with("Throttling") {
            return Error::rate_limited(detail);
        }

        if code == "DomainRecordConflict" || code == "DomainRecordLocked" {
            return Error::conflict(detail);
        }

        if code.starts_with("ServiceUnavailable") || code == "InternalError" {
            return Error::transient(detail);
        }

        match self.status {
            401 | 403 => Error::auth(detail),
            429 => Error::rate_limited(detail),
            409 => Error::conflict(detail),
            500..=599 => Error::transient(detail),
            _ => Error::provider(PROVIDER_NAME, detail),
        }
    }
}

/// Why a call did not produce a parsed body
#[derive(Debug)]
pub enum CallError {
    /// The API answered with an error body
    Service(ServiceError),
    /// Transport, timeout or decoding failure (already classified)
    Local(Error),
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Service(service) => service.classify(),
            CallError::Local(error) => error,
        }
    }
}
