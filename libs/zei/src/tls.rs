//! rustls setup for the default transport.
//!
//! Native roots come from the OS store, which is slow to read on some
//! platforms, so they are loaded once per process.

use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static NATIVE_LOADS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

/// Failure to build a rustls configuration from the OS trust store.
#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("no native root CA certificates found in the OS certificate store")]
    NoNativeRoots,

    #[error("none of the {found} native root certificates could be parsed")]
    UnparsableNativeRoots { found: usize },

    #[error("unsupported TLS protocol versions: {0}")]
    ProtocolVersions(#[source] rustls::Error),
}

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    NATIVE_LOADS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "failed to load a native root certificate");
    }

    if loaded.certs.is_empty() {
        tracing::warn!("OS certificate store is empty");
    } else {
        tracing::debug!(count = loaded.certs.len(), "loaded native root certificates");
    }

    loaded.certs
}

/// Native root certificates, read from the OS on first use.
#[must_use]
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(load_native_roots).as_slice()
}

/// Process default crypto provider if one is installed, aws-lc-rs otherwise.
///
/// Never installs a global default.
#[must_use]
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// rustls client configuration trusting the OS root store.
///
/// # Errors
/// Fails when the store is empty or none of its certificates parse, so a
/// broken trust store surfaces when the transport is built rather than on
/// the first handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, TlsSetupError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(TlsSetupError::NoNativeRoots);
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "skipped unparsable native root certificates");
    }
    if added == 0 {
        return Err(TlsSetupError::UnparsableNativeRoots { found: certs.len() });
    }

    let config = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(TlsSetupError::ProtocolVersions)?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn native_roots_loaded_at_most_once() {
        // Other tests may have populated the cache already
        let before = NATIVE_LOADS.load(Ordering::SeqCst);

        let first = native_root_certs();
        let second = native_root_certs();

        let after = NATIVE_LOADS.load(Ordering::SeqCst);
        assert!(after <= before + 1);
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn native_client_config_does_not_panic() {
        // Minimal containers have no OS roots; both outcomes are acceptable
        match native_roots_client_config() {
            Ok(config) => assert!(config.alpn_protocols.is_empty()),
            Err(e) => assert!(matches!(
                e,
                TlsSetupError::NoNativeRoots | TlsSetupError::UnparsableNativeRoots { .. }
            )),
        }
    }

    #[test]
    fn crypto_provider_is_available() {
        let provider = get_crypto_provider();
        assert!(!provider.cipher_suites.is_empty());
    }
}
