use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Certificate,
    PrivateKey,
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Certificate => "cert",
            Self::PrivateKey => "key",
        })
    }
}

#[derive(Debug, Error)]
pub enum TlsMaterialError {
    #[error("missing {kind} file {path:?}")]
    Missing { kind: MaterialKind, path: PathBuf },
    #[error("failed to stat {kind} file {path:?}: {source}")]
    Stat {
        kind: MaterialKind,
        path: PathBuf,
        source: io::Error,
    },
}

impl TlsMaterialError {
    pub fn kind(&self) -> MaterialKind {
        match self {
            Self::Missing { kind, .. } | Self::Stat { kind, .. } => *kind,
        }
    }
}

/// Certificate and key locations for the TLS listeners.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsPaths {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Checks that both files exist. Content is not inspected.
    pub fn verify(&self) -> Result<(), TlsMaterialError> {
        verify(&self.cert, &self.key)
    }
}

/// Fails when either the certificate or the key cannot be found.
pub fn verify(cert: &Path, key: &Path) -> Result<(), TlsMaterialError> {
    check(MaterialKind::Certificate, cert)?;
    check(MaterialKind::PrivateKey, key)
}

fn check(kind: MaterialKind, path: &Path) -> Result<(), TlsMaterialError> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(TlsMaterialError::Missing {
            kind,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(TlsMaterialError::Stat {
            kind,
            path: path.to_path_buf(),
            source,
        }),
    }
}
