//! # Satellite Transport
//!
//! Everything needed to ask one remote satellite to run one check:
//!
//! - [`Transport`]: the trait the strategy engine talks to, so strategies
//!   are testable against canned in-memory transports
//! - [`client::TlsTransport`]: the production implementation. One
//!   authenticated, encrypted connection per call, one request, one
//!   response, close
//! - [`tls`]: TLS client configuration from the configured material
//!
//! Every failure on this path collapses into a [`TransportError`] whose
//! display text is the human-readable cause; the strategy engine maps it
//! to an UNKNOWN result and never aborts the run because of it.

pub mod client;
pub mod tls;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::common::messages::{Location, WireResponse};

pub use client::{TlsTransport, CALL_TIMEOUT_SECS};

/// Anything that can go wrong between the dispatcher and one satellite.
/// Never fatal: the caller recovers it into an UNKNOWN location result.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot connect to {host} ({addr}): {cause}")]
    Connect {
        host: String,
        addr: String,
        cause: String,
    },
    #[error("TLS failure talking to {host}: {cause}")]
    Tls { host: String, cause: String },
    #[error("no answer from {host} within {timeout}s")]
    Timeout { host: String, timeout: u64 },
    #[error("invalid response from {host}: {cause}")]
    Protocol { host: String, cause: String },
    /// Unusable local TLS material; surfaces at transport construction,
    /// before any dispatch
    #[error("unusable TLS material: {0}")]
    Material(String),
}

/// One remote call to one satellite.
///
/// Implementations send the opaque command to the location and hand back
/// the response envelope. The production implementation is
/// [`TlsTransport`]; tests substitute canned transports.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, location: &Location, command: &Value)
        -> Result<WireResponse, TransportError>;
}
