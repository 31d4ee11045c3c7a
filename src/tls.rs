//! TLS client configuration: system roots, optional CA bundle from file, optional skip-verify.

use crate::error::{LdapError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ClientConfig;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pemfile::certs;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::warn;

/// Accepts any certificate chain and host name, but still checks that the
/// handshake is signed by the key in the presented certificate.
#[derive(Debug)]
struct SkipChainVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for SkipChainVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Build a client config with system roots plus the certificates in `ca_file`.
pub fn client_config(ca_file: Option<&str>, skip_verify: bool) -> Result<Arc<ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    match rustls_native_certs::load_native_certs() {
        Ok(native) => {
            for cert in native {
                let _ = root_store.add(cert);
            }
        }
        Err(e) => warn!(error = %e, "failed to load system CA certificates"),
    }
    if let Some(path) = ca_file {
        for cert in load_certs_from_file(path)? {
            root_store
                .add(cert)
                .map_err(|e| LdapError::Tls(format!("add CA from {}: {}", path, e)))?;
        }
    }
    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    if skip_verify {
        let provider = CryptoProvider::get_default()
            .ok_or_else(|| LdapError::Tls("no TLS crypto provider installed".to_string()))?;
        warn!("TLS certificate verification disabled");
        config.dangerous().set_certificate_verifier(Arc::new(SkipChainVerifier {
            algorithms: provider.signature_verification_algorithms,
        }));
    }
    Ok(Arc::new(config))
}

pub fn connector(config: Arc<ClientConfig>) -> TlsConnector {
    TlsConnector::from(config)
}

pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host)
        .map(|name| name.to_owned())
        .map_err(|e| LdapError::Tls(format!("invalid server name {:?}: {}", host, e)))
}

fn load_certs_from_file(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = fs::File::open(path)
        .map_err(|e| LdapError::Tls(format!("open CA file {}: {}", path, e)))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| LdapError::Tls(format!("parse PEM certificates in {}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(LdapError::Tls(format!("no certificates found in {}", path)));
    }
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_server_name() {
        assert!(server_name("ldap.example.com").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("not a host").is_err());
    }

    #[test]
    fn test_missing_ca_file() {
        let err = client_config(Some("/nonexistent/ca.pem"), false).unwrap_err();
        assert!(matches!(err, LdapError::Tls(_)));
    }

    #[test]
    fn test_ca_file_without_certificates() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a pem file\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(client_config(Some(&path), false).is_err());
    }

    #[test]
    fn test_skip_verify_config_builds() {
        assert!(client_config(None, true).is_ok());
    }

    #[test]
    fn test_skip_verify_keeps_provider_schemes() {
        client_config(None, true).unwrap();
        let provider = CryptoProvider::get_default().unwrap();
        let verifier = SkipChainVerifier {
            algorithms: provider.signature_verification_algorithms,
        };
        let schemes = verifier.supported_verify_schemes();
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
        assert_eq!(schemes, provider.signature_verification_algorithms.supported_schemes());
    }
}
