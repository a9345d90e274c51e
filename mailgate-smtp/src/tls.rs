use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use mailgate_common::tracing;
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
};

use crate::error::{TlsError, TlsResult};

/// Server-side TLS state shared by every encrypted listener of a server.
///
/// Loaded once per start; each accepted connection clones the acceptor.
#[derive(Clone)]
pub struct TlsMaterial {
    acceptor: TlsAcceptor,
}

impl core::fmt::Debug for TlsMaterial {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.debug_struct("TlsMaterial").finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Load a PEM certificate chain and private key.
    ///
    /// # Errors
    /// Fails if either file cannot be read or parsed, or if rustls rejects the
    /// pair.
    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all, fields(cert = %cert.display()))]
    pub fn load(cert: &Path, key: &Path) -> TlsResult<Self> {
        let certs = load_certs(cert)?;
        let key = load_key(key)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(Self::from_config(Arc::new(config)))
    }

    pub fn from_config(config: Arc<ServerConfig>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
        }
    }

    pub(crate) fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }
}

fn load_certs(path: &Path) -> TlsResult<Vec<CertificateDer<'static>>> {
    let load_error = |reason: String| TlsError::CertificateLoad {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| load_error(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| load_error(e.to_string()))?;

    if certs.is_empty() {
        return Err(load_error("No certificates found".to_string()));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    let path_str = path.display().to_string();
    let mut reader = BufReader::new(File::open(path).map_err(|e| TlsError::KeyLoad {
        path: path_str.clone(),
        reason: e.to_string(),
    })?);

    match rustls_pemfile::read_one(&mut reader).map_err(|e| TlsError::KeyLoad {
        path: path_str.clone(),
        reason: e.to_string(),
    })? {
        Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
        Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
        Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
        _ => Err(TlsError::KeyLoad {
            path: path_str,
            reason: "Unable to determine key file format (expected PKCS1, PKCS8, or SEC1)"
                .to_string(),
        }),
    }
}
