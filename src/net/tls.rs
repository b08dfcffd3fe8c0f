//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("{present} file is set without a {missing} file")]
    Mismatched {
        present: &'static str,
        missing: &'static str,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    #[error("rejected certificate/key pair: {0}")]
    Rustls(#[source] std::io::Error),
}

/// Load TLS configuration from the certificate and key files.
///
/// Returns `Ok(None)` when neither file is configured. Setting exactly one of
/// them is an error, never a silent plaintext fallback.
pub async fn load_tls_config(config: &TlsConfig) -> Result<Option<RustlsConfig>, TlsError> {
    let (cert_path, key_path) = match (&config.cert_file, &config.key_file) {
        (None, None) => return Ok(None),
        (Some(cert), Some(key)) => (Path::new(cert), Path::new(key)),
        (Some(_), None) => {
            return Err(TlsError::Mismatched {
                present: "certificate",
                missing: "key",
            })
        }
        (None, Some(_)) => {
            return Err(TlsError::Mismatched {
                present: "key",
                missing: "certificate",
            })
        }
    };

    let certs = read_certs(cert_path)?;
    let key = read_private_key(key_path)?;

    let tls = RustlsConfig::from_der(certs, key)
        .await
        .map_err(TlsError::Rustls)?;

    tracing::info!(cert = %cert_path.display(), "TLS material loaded");
    Ok(Some(tls))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn read_certs(path: &Path) -> Result<Vec<Vec<u8>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<Vec<u8>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .map(|key| key.secret_der().to_vec())
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
