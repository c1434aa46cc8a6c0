//! TLS material loading

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::TlsConfig;
use crate::errors::RelayError;

/// Fail with remediation instructions unless both files exist
pub fn check_certificate_files(tls: &TlsConfig) -> Result<(), RelayError> {
    if tls.cert_path.is_file() && tls.key_path.is_file() {
        Ok(())
    } else {
        Err(RelayError::missing_certificate(&tls.cert_path, &tls.key_path))
    }
}

/// Build the rustls server configuration (HTTP/1.1 only, for WebSocket upgrades)
pub fn load_server_config(tls: &TlsConfig) -> Result<Arc<rustls::ServerConfig>, RelayError> {
    check_certificate_files(tls)?;

    let certs = load_certs(tls)?;
    let key = load_key(tls)?;

    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| RelayError::TlsError(format!("Unsupported protocol versions: {}", e)))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| RelayError::TlsError(format!("Certificate and key do not match: {}", e)))?;

    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

fn load_certs(tls: &TlsConfig) -> Result<Vec<CertificateDer<'static>>, RelayError> {
    let mut reader = BufReader::new(File::open(&tls.cert_path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RelayError::TlsError(format!("Invalid certificate PEM: {}", e)))?;

    if certs.is_empty() {
        return Err(RelayError::TlsError(format!(
            "No certificates found in {}",
            tls.cert_path.display()
        )));
    }
    Ok(certs)
}

fn load_key(tls: &TlsConfig) -> Result<PrivateKeyDer<'static>, RelayError> {
    let mut reader = BufReader::new(File::open(&tls.key_path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| RelayError::TlsError(format!("Invalid key PEM: {}", e)))?
        .ok_or_else(|| {
            RelayError::TlsError(format!("No private key found in {}", tls.key_path.display()))
        })
}
