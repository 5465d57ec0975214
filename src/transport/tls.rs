//! # TLS Client Setup
//!
//! Builds the rustls client configuration for satellite connections from
//! the configured material: CA bundle, optional client certificate/key,
//! and the peer verification mode.
//!
//! With `verify = "none"` the connection is still encrypted but the
//! satellite certificate is accepted unchecked; the dispatcher logs a
//! warning so the mode never goes unnoticed in production.

use log::warn;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider,
};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::common::config::{TlsConfig, VerifyMode};
use crate::transport::TransportError;

/// Build the connector used for every satellite call of this run.
pub fn build_connector(config: &TlsConfig) -> Result<TlsConnector, TransportError> {
    let builder = ClientConfig::builder();

    let builder = match config.verify {
        VerifyMode::Peer => {
            let roots = load_root_store(config.ca_file.as_deref())?;
            builder.with_root_certificates(roots)
        }
        VerifyMode::None => {
            warn!("⚠️  TLS peer verification is disabled; satellite identity is unchecked");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
        }
    };

    let client_config = match (&config.cert_file, &config.key_file) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TransportError::Material(format!("client certificate rejected: {}", e)))?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// The name the satellite certificate is checked against. The location
/// hostname is the identity; the IP address is only a dial target.
pub fn peer_name(hostname: &str, ipaddr: &str) -> Result<ServerName<'static>, TransportError> {
    ServerName::try_from(hostname.to_string())
        .or_else(|_| ServerName::try_from(ipaddr.to_string()))
        .map_err(|_| TransportError::Tls {
            host: hostname.to_string(),
            cause: "hostname is not a valid TLS peer name".to_string(),
        })
}

fn load_root_store(ca_file: Option<&Path>) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    let Some(path) = ca_file else {
        warn!("⚠️  no CA bundle configured; satellite certificates cannot verify");
        return Ok(roots);
    };
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| TransportError::Material(format!("bad CA certificate in {}: {}", path.display(), e)))?;
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let pem = fs::read(path)
        .map_err(|e| TransportError::Material(format!("cannot read {}: {}", path.display(), e)))?;
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut pem.as_slice()).collect();
    certs.map_err(|e| TransportError::Material(format!("cannot parse {}: {}", path.display(), e)))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let pem = fs::read(path)
        .map_err(|e| TransportError::Material(format!("cannot read {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| TransportError::Material(format!("cannot parse {}: {}", path.display(), e)))?
        .ok_or_else(|| TransportError::Material(format!("no private key found in {}", path.display())))
}

/// Certificate verifier for `verify = "none"`: accepts any satellite
/// certificate while still checking handshake signatures, so the session
/// stays encrypted.
#[derive(Debug)]
struct NoVerification(CryptoProvider);

impl NoVerification {
    fn new() -> Self {
        Self(aws_lc_rs::default_provider())
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::TlsConfig;

    #[test]
    fn verify_none_builds_without_any_material() {
        let config = TlsConfig {
            verify: VerifyMode::None,
            ..TlsConfig::default()
        };
        build_connector(&config).unwrap();
    }

    #[test]
    fn missing_ca_file_is_a_material_error() {
        let config = TlsConfig {
            ca_file: Some("/nonexistent/ca.pem".into()),
            ..TlsConfig::default()
        };
        match build_connector(&config) {
            Err(TransportError::Material(msg)) => assert!(msg.contains("/nonexistent/ca.pem")),
            other => panic!("expected material error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn peer_name_prefers_the_hostname() {
        let name = peer_name("sat1.example.net", "192.0.2.11").unwrap();
        assert!(matches!(name, ServerName::DnsName(_)));
    }
}
