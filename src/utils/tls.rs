//! Utility functions for dealing with TLS.

use std::io;
use std::path::Path;
use std::sync::Arc;
use log::error;
use rcgen::{CertificateParams, DnType, KeyPair};
use tokio_rustls::rustls::crypto::ring::default_provider;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use crate::error::ExitError;
use super::fatal;

pub use tokio_rustls::rustls::ServerConfig;


//------------ create_server_config -----------------------------------------

/// Creates the TLS server config.
///
/// The certificate file may contain a chain. The key file must contain
/// exactly one private key in PKCS#1, PKCS#8 or SEC1 format.
pub fn create_server_config(
    key_path: &Path, cert_path: &Path
) -> Result<ServerConfig, ExitError> {
    let certs = rustls_pemfile::certs(
        &mut fatal::open_file(cert_path)?
    ).collect::<Result<Vec<CertificateDer>, _>>().map_err(|err| {
        error!(
            "Failed to read TLS certificate file '{}': {}.",
            cert_path.display(), err
        );
        ExitError::Generic
    })?;
    if certs.is_empty() {
        error!(
            "TLS certificate file '{}' does not contain any certificates.",
            cert_path.display()
        );
        return Err(ExitError::Generic)
    }

    let key = read_private_key(key_path)?;

    ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|err| {
            error!("Failed to create TLS server config: {}", err);
            ExitError::Generic
        })?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| {
            error!("Failed to create TLS server config: {}", err);
            ExitError::Generic
        })
}

fn read_private_key(
    key_path: &Path
) -> Result<PrivateKeyDer<'static>, ExitError> {
    let mut file = fatal::open_file(key_path)?;
    match rustls_pemfile::private_key(&mut file) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => {
            error!(
                "TLS key file '{}' does not contain any usable keys.",
                key_path.display()
            );
            Err(ExitError::Generic)
        }
        Err(err) => {
            error!(
                "Failed to read TLS key file '{}': {}.",
                key_path.display(), err
            );
            Err(ExitError::Generic)
        }
    }
}


//------------ SelfSignedCert ------------------------------------------------

/// A freshly generated self-signed certificate and its private key.
pub struct SelfSignedCert {
    /// The certificate in PEM format.
    pub cert_pem: String,

    /// The private key in PEM format.
    pub key_pem: String,
}

impl SelfSignedCert {
    /// The names the certificate is issued for.
    const NAMES: &'static [&'static str] = &[
        "localhost", "127.0.0.1", "::1"
    ];

    /// Generates a new certificate.
    pub fn generate() -> Result<Self, io::Error> {
        let mut params = CertificateParams::new(
            Self::NAMES.iter().map(|name| name.to_string()).collect::<Vec<_>>()
        ).map_err(io::Error::other)?;
        params.distinguished_name.push(DnType::OrganizationName, "RanServer");
        params.distinguished_name.push(DnType::CommonName, "localhost");
        let key = KeyPair::generate().map_err(io::Error::other)?;
        let cert = params.self_signed(&key).map_err(io::Error::other)?;
        Ok(SelfSignedCert {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_cert_is_usable() {
        let cert = SelfSignedCert::generate().unwrap();
        assert!(cert.cert_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(cert.key_pem.contains("PRIVATE KEY-----"));

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, &cert.cert_pem).unwrap();
        std::fs::write(&key_path, &cert.key_pem).unwrap();
        assert!(create_server_config(&key_path, &cert_path).is_ok());
    }

    #[test]
    fn key_file_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = SelfSignedCert::generate().unwrap();
        let cert_path = dir.path().join("cert.pem");
        std::fs::write(&cert_path, &cert.cert_pem).unwrap();
        assert!(create_server_config(&cert_path, &cert_path).is_err());
    }
}
