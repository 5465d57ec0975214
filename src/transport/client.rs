//! # Transport Client
//!
//! The production [`Transport`] implementation: one authenticated,
//! encrypted connection per satellite call.
//!
//! ## Call Lifecycle
//!
//! 1. Connect to `location.ipaddr` on the satellite service port
//! 2. TLS handshake, verifying the peer name against `location.hostname`
//! 3. Send one `{action: "exec", authkey, data}` request envelope
//! 4. Read exactly one response envelope
//! 5. Drop the connection (there is no reuse)
//!
//! The whole lifecycle runs under a hard 60 second wall-clock timeout; on
//! expiry the in-flight call is abandoned, the connection discarded, and
//! the caller sees a [`TransportError::Timeout`]. No call is ever left
//! hanging.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::common::config::{AuthConfig, TlsConfig};
use crate::common::connection::Connection;
use crate::common::messages::{Location, WireRequest, WireResponse};
use crate::transport::tls::{build_connector, peer_name};
use crate::transport::{Transport, TransportError};

/// Hard wall-clock bound on one complete satellite call.
pub const CALL_TIMEOUT_SECS: u64 = 60;

/// TLS transport to the satellites. Cheap to share: one connector, one
/// auth table, a fresh connection per call.
pub struct TlsTransport {
    connector: TlsConnector,
    auth: AuthConfig,
    port: u16,
    timeout: Duration,
}

impl TlsTransport {
    /// Build the transport from the configured TLS material and auth keys.
    ///
    /// Unusable material surfaces here as [`TransportError::Material`],
    /// before any dispatch begins.
    pub fn new(tls: &TlsConfig, auth: AuthConfig, port: u16) -> Result<Self, TransportError> {
        Ok(Self {
            connector: build_connector(tls)?,
            auth,
            port,
            timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
        })
    }

    /// Override the call deadline. Used by tests; production keeps the
    /// 60 second contract.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call_once(
        &self,
        location: &Location,
        command: &Value,
    ) -> Result<WireResponse, TransportError> {
        let addr = format!("{}:{}", location.ipaddr, self.port);
        debug!("calling satellite {} at {}", location.hostname, addr);

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::Connect {
                host: location.hostname.clone(),
                addr: addr.clone(),
                cause: e.to_string(),
            })?;

        let name = peer_name(&location.hostname, &location.ipaddr)?;
        let stream = self
            .connector
            .connect(name, tcp)
            .await
            .map_err(|e| TransportError::Tls {
                host: location.hostname.clone(),
                cause: e.to_string(),
            })?;

        let mut conn = Connection::new(stream);
        let request = WireRequest::exec(self.auth.resolve(location), command.clone());
        conn.send(&request).await.map_err(|e| TransportError::Protocol {
            host: location.hostname.clone(),
            cause: e.to_string(),
        })?;

        match conn.recv::<WireResponse>().await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(TransportError::Protocol {
                host: location.hostname.clone(),
                cause: "connection closed before a response arrived".to_string(),
            }),
            Err(e) => Err(TransportError::Protocol {
                host: location.hostname.clone(),
                cause: e.to_string(),
            }),
        }
        // The connection drops here; every call opens a fresh one.
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn call(
        &self,
        location: &Location,
        command: &Value,
    ) -> Result<WireResponse, TransportError> {
        match tokio::time::timeout(self.timeout, self.call_once(location, command)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                host: location.hostname.clone(),
                timeout: self.timeout.as_secs(),
            }),
        }
    }
}
