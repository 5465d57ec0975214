//! # Wire Model
//!
//! Defines the types exchanged between the dispatcher and the remote
//! check satellites, plus the aggregated verdict handed to the monitoring
//! system:
//! - Request/response envelopes sent over the satellite connection
//! - Per-location check results with the four-valued monitoring status
//! - The consolidated `Verdict` produced by one dispatcher invocation
//!
//! Envelopes are serialized to JSON and sent over TLS with a 4-byte length
//! prefix (see [`connection`](super::connection)).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// CHECK STATUS - The four-valued monitoring status with its severity order
// ============================================================================

/// Monitoring status of a single check or of the aggregated verdict.
///
/// The declaration order doubles as the severity order used for tie-breaking
/// between several locations: `Ok < Warning < Critical < Unknown`. A definite
/// answer, even a CRITICAL one, outranks an indefinite one, so UNKNOWN sorts
/// last and the "best" of several results is simply the minimum.
///
/// Any status string the dispatcher does not recognize deserializes to
/// `Unknown`; the same normalization applies to out-of-range numeric codes
/// via [`CheckStatus::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl<'de> Deserialize<'de> for CheckStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(CheckStatus::normalize(&raw))
    }
}

impl CheckStatus {
    /// Map a status string to the fixed four-valued set. Anything the
    /// dispatcher does not recognize normalizes to `Unknown`.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "OK" => CheckStatus::Ok,
            "WARNING" => CheckStatus::Warning,
            "CRITICAL" => CheckStatus::Critical,
            _ => CheckStatus::Unknown,
        }
    }

    /// Map a numeric plugin exit code to a status. Anything outside 0..=3
    /// normalizes to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => CheckStatus::Ok,
            1 => CheckStatus::Warning,
            2 => CheckStatus::Critical,
            _ => CheckStatus::Unknown,
        }
    }

    /// The process exit code the monitoring system expects for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckStatus::Ok => 0,
            CheckStatus::Warning => 1,
            CheckStatus::Critical => 2,
            CheckStatus::Unknown => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Critical => "CRITICAL",
            CheckStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LOCATIONS - Remote satellites able to run a forwarded check
// ============================================================================

/// One remote check agent ("satellite").
///
/// The hostname is the stable identity of a location; the IP address may
/// change between invocations and is always refreshed from the configured
/// set. The `last` flag marks where the previous rotate run stopped and is
/// only meaningful inside a persisted rotation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Unique key identifying this satellite (e.g. "sat1.example.net")
    pub hostname: String,
    /// Address the dispatcher actually connects to
    pub ipaddr: String,
    /// Per-location authentication key override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authkey: Option<String>,
    /// Rotation marker: true on the location the previous rotate run stopped at
    #[serde(default)]
    pub last: bool,
}

impl Location {
    pub fn new(hostname: &str, ipaddr: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ipaddr: ipaddr.to_string(),
            authkey: None,
            last: false,
        }
    }
}

// ============================================================================
// WIRE ENVELOPES - One request, one response per satellite connection
// ============================================================================

/// Request envelope sent to a satellite.
///
/// The `data` payload is the opaque check command; the dispatcher forwards
/// it verbatim and never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    /// Always "exec" for check dispatch
    pub action: String,
    /// Resolved authentication key for this satellite
    pub authkey: String,
    /// Opaque check command, forwarded verbatim
    pub data: Value,
}

impl WireRequest {
    pub fn exec(authkey: String, command: Value) -> Self {
        Self {
            action: "exec".to_string(),
            authkey,
            data: command,
        }
    }
}

/// Response envelope read back from a satellite.
///
/// `status` is "ok" when the satellite accepted and executed the forwarded
/// command; any other value is an envelope-level refusal (bad authkey,
/// unknown action, overload) explained by `message`. The actual check
/// outcome travels in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<LocationResult>,
}

impl WireResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Human-readable refusal cause for a non-ok envelope.
    pub fn refusal(&self) -> String {
        match &self.message {
            Some(msg) => msg.clone(),
            None => format!("satellite answered with status '{}'", self.status),
        }
    }
}

// ============================================================================
// RESULTS - Per-location outcome and the aggregated verdict
// ============================================================================

/// Outcome of one check executed on one location.
///
/// Produced exactly once per location per invocation, either adopted from
/// the satellite's response or synthesized as UNKNOWN when the satellite
/// could not be asked. Immutable after creation, except that a missing
/// hostname is stamped from the location the dispatcher talked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(default)]
    pub hostname: String,
    /// Opaque performance data reported by the probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    /// Opaque diagnostic payload reported by the probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl LocationResult {
    /// Synthesize the UNKNOWN result used whenever a location could not
    /// deliver a real answer. The message always names the location so
    /// no transport failure is silently dropped.
    pub fn unknown(hostname: &str, cause: &str) -> Self {
        Self {
            status: CheckStatus::Unknown,
            message: format!("{}: {}", hostname, cause),
            hostname: hostname.to_string(),
            stats: None,
            debug: None,
            tags: Vec::new(),
        }
    }

    /// Default-stamp the fields a satellite is allowed to omit.
    pub fn stamp_defaults(&mut self, location: &Location) {
        if self.hostname.is_empty() {
            self.hostname = location.hostname.clone();
        }
    }
}

/// One collected debug payload, tagged with the location it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub hostname: String,
    pub debug: Value,
}

/// The single consolidated answer of one dispatcher invocation.
///
/// Built once per invocation and immutable once emitted. `result` carries
/// the auxiliary per-location detail (all attempted results for the ordered
/// strategies, the abnormal ones for `multiple`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: CheckStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub debug: Vec<DebugEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "result")]
    pub results: Vec<LocationResult>,
}

impl Verdict {
    pub fn unknown(message: &str) -> Self {
        Self {
            status: CheckStatus::Unknown,
            message: message.to_string(),
            stats: None,
            debug: Vec::new(),
            results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_ranks_unknown_worst() {
        assert!(CheckStatus::Ok < CheckStatus::Warning);
        assert!(CheckStatus::Warning < CheckStatus::Critical);
        assert!(CheckStatus::Critical < CheckStatus::Unknown);

        // The best of a definite CRITICAL and an indefinite UNKNOWN is the CRITICAL.
        let best = CheckStatus::Critical.min(CheckStatus::Unknown);
        assert_eq!(best, CheckStatus::Critical);
    }

    #[test]
    fn out_of_range_codes_normalize_to_unknown() {
        assert_eq!(CheckStatus::from_code(0), CheckStatus::Ok);
        assert_eq!(CheckStatus::from_code(1), CheckStatus::Warning);
        assert_eq!(CheckStatus::from_code(2), CheckStatus::Critical);
        assert_eq!(CheckStatus::from_code(3), CheckStatus::Unknown);
        assert_eq!(CheckStatus::from_code(42), CheckStatus::Unknown);
        assert_eq!(CheckStatus::from_code(-1), CheckStatus::Unknown);
    }

    #[test]
    fn unrecognized_status_string_deserializes_to_unknown() {
        let r: LocationResult =
            serde_json::from_str(r#"{"status":"DEGRADED","message":"odd"}"#).unwrap();
        assert_eq!(r.status, CheckStatus::Unknown);

        let r: LocationResult =
            serde_json::from_str(r#"{"status":"CRITICAL","message":"down"}"#).unwrap();
        assert_eq!(r.status, CheckStatus::Critical);
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&CheckStatus::Warning).unwrap(), r#""WARNING""#);
        assert_eq!(CheckStatus::Unknown.exit_code(), 3);
    }

    #[test]
    fn synthesized_unknown_names_the_location() {
        let r = LocationResult::unknown("sat1.example.net", "connection refused");
        assert_eq!(r.status, CheckStatus::Unknown);
        assert!(r.message.contains("sat1.example.net"));
        assert!(r.message.contains("connection refused"));
    }

    #[test]
    fn stamping_only_fills_missing_hostname() {
        let loc = Location::new("sat1.example.net", "192.0.2.11");

        let mut from_satellite: LocationResult =
            serde_json::from_str(r#"{"status":"OK","message":"fine"}"#).unwrap();
        from_satellite.stamp_defaults(&loc);
        assert_eq!(from_satellite.hostname, "sat1.example.net");

        let mut already_named: LocationResult =
            serde_json::from_str(r#"{"status":"OK","message":"fine","hostname":"other"}"#).unwrap();
        already_named.stamp_defaults(&loc);
        assert_eq!(already_named.hostname, "other");
    }
}
