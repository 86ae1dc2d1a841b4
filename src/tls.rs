//! Transport security for accepted connections.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;

/// TLS setup errors
#[derive(Debug)]
pub enum TlsError {
    /// Certificate or key file could not be read
    FileRead(PathBuf, io::Error),
    /// The certificate file holds no certificates
    NoCertificates(PathBuf),
    /// The key file holds no private key
    NoPrivateKey(PathBuf),
    /// rustls rejected the certificate/key pair
    Rustls(rustls::Error),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::FileRead(path, e) => {
                write!(f, "Failed to read TLS file '{}': {}", path.display(), e)
            }
            TlsError::NoCertificates(path) => {
                write!(f, "No certificates found in '{}'", path.display())
            }
            TlsError::NoPrivateKey(path) => {
                write!(f, "No private key found in '{}'", path.display())
            }
            TlsError::Rustls(e) => write!(f, "Invalid TLS certificate/key pair: {e}"),
        }
    }
}

impl std::error::Error for TlsError {}

/// Build an acceptor from PEM encoded certificate chain and private key files.
pub fn load_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(TlsError::Rustls)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| TlsError::FileRead(path.to_path_buf(), e))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::FileRead(path.to_path_buf(), e))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| TlsError::FileRead(path.to_path_buf(), e))?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_acceptor_from_pem_files() {
        let material = testing::self_signed();
        let result = load_acceptor(material.cert_file.path(), material.key_file.path());
        assert!(result.is_ok());
    }

    #[test]
    fn test_key_and_cert_swapped() {
        let material = testing::self_signed();
        let result = load_acceptor(material.key_file.path(), material.cert_file.path());
        assert!(matches!(result, Err(TlsError::NoCertificates(_))));
    }

    #[test]
    fn test_missing_cert_file() {
        let key = NamedTempFile::new().unwrap();
        let result = load_acceptor(Path::new("/nonexistent/algo.crt"), key.path());
        assert!(matches!(result, Err(TlsError::FileRead(_, _))));
    }

    #[test]
    fn test_cert_file_without_certificates() {
        let mut cert = NamedTempFile::new().unwrap();
        cert.write_all(b"not a certificate\n").unwrap();
        let key = NamedTempFile::new().unwrap();

        let result = load_acceptor(cert.path(), key.path());
        assert!(matches!(result, Err(TlsError::NoCertificates(_))));
    }

    #[test]
    fn test_key_file_without_key() {
        let mut key = NamedTempFile::new().unwrap();
        key.write_all(b"no key here\n").unwrap();

        let result = load_key(key.path());
        assert!(matches!(result, Err(TlsError::NoPrivateKey(_))));
    }
}
