use rumqttc::{TlsConfiguration, Transport};
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not read system trust store: {0}")]
    NativeCerts(#[from] std::io::Error),
    #[error("system trust store has no usable certificates")]
    NoRootCertificates,
}

/// TLS 1.2 is the floor; TLS 1.3 is preferred when the broker offers it.
static PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

fn system_roots() -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    let mut skipped = 0usize;
    for cert in rustls_native_certs::load_native_certs()? {
        if let Err(e) = roots.add(cert) {
            skipped += 1;
            debug!("Skipping unusable system certificate: {}", e);
        }
    }
    if skipped > 0 {
        warn!("Ignored {} unparseable certificates from the system trust store", skipped);
    }
    if roots.is_empty() {
        return Err(TlsError::NoRootCertificates);
    }
    Ok(roots)
}

pub fn client_config() -> Result<ClientConfig, TlsError> {
    let roots = system_roots()?;
    Ok(ClientConfig::builder_with_protocol_versions(PROTOCOL_VERSIONS)
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Transport for the session: rustls over TCP when encryption is on,
/// plain TCP otherwise.
pub fn transport(use_encryption: bool) -> Result<Transport, TlsError> {
    if !use_encryption {
        return Ok(Transport::tcp());
    }
    let config = client_config()?;
    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(config))))
}
