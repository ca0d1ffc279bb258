//! TLS context construction.
//!
//! Certificates and keys are loaded once at engine init; a failure there is
//! fatal to `init`. The configured cipher list and protocol-version option
//! bits narrow the rustls provider before the server config is built.

use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedProtocolVersion};

use crate::config::{EngineConfig, SSL_OPT_NO_TLS12, SSL_OPT_NO_TLS13};
use crate::error::{EngineError, Result};

/// Builds the process-wide rustls server config from engine configuration.
pub(crate) fn build_tls_config(config: &EngineConfig) -> Result<Arc<ServerConfig>> {
    let cert_path = config
        .ssl_certificate
        .as_ref()
        .ok_or(EngineError::InvalidParams("missing certificate path"))?;
    let key_path = config
        .ssl_key
        .as_ref()
        .ok_or(EngineError::InvalidParams("missing private key path"))?;

    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| EngineError::Tls(format!("certificate load failed: {e}")))?
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| EngineError::Tls(format!("certificate parse failed: {e}")))?;
    if certs.is_empty() {
        return Err(EngineError::Tls("certificate file holds no certificate".into()));
    }

    let key = PrivateKeyDer::from_pem_file(key_path)
        .map_err(|e| EngineError::Tls(format!("private key load failed: {e}")))?;

    let provider = provider_for(config)?;
    let versions = versions_for(config);

    let tls = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)
        .map_err(|e| EngineError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| EngineError::Tls(e.to_string()))?;

    Ok(Arc::new(tls))
}

/// Restricts the ring provider to the configured cipher list, when one is
/// set. Entries are matched against rustls suite names case-insensitively,
/// with `-` treated as `_`.
fn provider_for(config: &EngineConfig) -> Result<CryptoProvider> {
    let mut provider = ring::default_provider();

    let list = match config.ssl_cipher_list.as_deref().map(str::trim) {
        Some(list) if !list.is_empty() => list,
        _ => return Ok(provider),
    };

    let wanted: Vec<String> = list
        .split(':')
        .map(|s| s.trim().replace('-', "_"))
        .filter(|s| !s.is_empty())
        .collect();

    provider.cipher_suites.retain(|suite| {
        let name = format!("{:?}", suite.suite());
        wanted.iter().any(|w| name.eq_ignore_ascii_case(w))
    });

    if provider.cipher_suites.is_empty() {
        return Err(EngineError::Tls(
            "cipher list matches no supported suite".into(),
        ));
    }
    Ok(provider)
}

fn versions_for(config: &EngineConfig) -> Vec<&'static SupportedProtocolVersion> {
    let mut versions = Vec::with_capacity(2);
    if config.ssl_options & SSL_OPT_NO_TLS12 == 0 {
        versions.push(&rustls::version::TLS12);
    }
    if config.ssl_options & SSL_OPT_NO_TLS13 == 0 {
        versions.push(&rustls::version::TLS13);
    }
    versions
}
