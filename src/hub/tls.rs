//! TLS material for the hub: server side requires and verifies client
//! certificates against the federation CA; client side presents its own
//! certificate and pins the same CA.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::error::Error;

/// Client-side TLS material in the shape reqwest consumes.
pub struct ClientTls {
    /// The client certificate and key presented to the server.
    pub identity: reqwest::Identity,
    /// The CA the server certificate must chain to.
    pub ca: reqwest::Certificate,
}

/// Build a server config from PEM files. The CA file drives client
/// certificate verification; connections without a valid client
/// certificate are rejected during the handshake.
pub fn server_config(
    cert_file: &Path,
    key_file: &Path,
    ca_file: &Path,
) -> Result<Arc<ServerConfig>, Error> {
    server_config_from_pem(&read(cert_file)?, &read(key_file)?, &read(ca_file)?)
}

/// Build a server config from in-memory PEM text.
pub fn server_config_from_pem(
    cert_pem: &str,
    key_pem: &str,
    ca_pem: &str,
) -> Result<Arc<ServerConfig>, Error> {
    install_crypto_provider();

    let certs = parse_certs(cert_pem)?;
    let key = parse_private_key(key_pem)?;

    let mut roots = RootCertStore::empty();
    for cert in parse_certs(ca_pem)? {
        roots.add(cert)?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| Error::Config(format!("cannot build client verifier: {e}")))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

/// Load client TLS material from PEM files.
pub fn client_tls(cert_file: &Path, key_file: &Path, ca_file: &Path) -> Result<ClientTls, Error> {
    let mut identity_pem = read(cert_file)?;
    identity_pem.push('\n');
    identity_pem.push_str(&read(key_file)?);

    client_tls_from_pem(&identity_pem, &read(ca_file)?)
}

/// Build client TLS material from in-memory PEM text; `identity_pem`
/// holds the certificate and private key concatenated.
pub fn client_tls_from_pem(identity_pem: &str, ca_pem: &str) -> Result<ClientTls, Error> {
    install_crypto_provider();

    let identity = reqwest::Identity::from_pem(identity_pem.as_bytes())?;
    let ca = reqwest::Certificate::from_pem(ca_pem.as_bytes())?;

    Ok(ClientTls { identity, ca })
}

fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read TLS file {}: {e}", path.display())))
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(pem.as_bytes());
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("cannot parse certificate: {e}")))?;

    if certs.is_empty() {
        return Err(Error::Config("no certificate found in PEM input".to_string()));
    }
    Ok(certs)
}

fn parse_private_key(pem: &str) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader = BufReader::new(pem.as_bytes());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Config(format!("cannot parse private key: {e}")))?
        .ok_or_else(|| Error::Config("no private key found in PEM input".to_string()))
}

/// The default crypto provider must be installed once before any rustls
/// config is built; repeat calls are ignored.
fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}


#[cfg(test)]
pub(crate) use testutil::generate as test_material;
