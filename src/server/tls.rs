// src/server/tls.rs

//! TLS acceptor setup from PEM certificate and key files.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::info;

use crate::config::Config;

/// Builds the TLS acceptor when TLS is enabled in the configuration.
pub fn setup_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    if !config.tls.enabled {
        return Ok(None);
    }

    info!("TLS is enabled. Loading certificate and key.");
    let certs = load_certs(&config.tls.cert_path)?;
    let key = load_key(&config.tls.key_path)?;
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open certificate file '{}': {}", path, e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in '{}'", path));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open private key file '{}': {}", path, e))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("No private key found in key file '{}'", path))
}
