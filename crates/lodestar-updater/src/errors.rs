use std::fmt;
use thiserror::Error;

/// What an `Ensure` failure was trying to guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureTarget {
    Payload,
    Runtime,
    Assets,
}

impl fmt::Display for EnsureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsureTarget::Payload => write!(f, "hook payload"),
            EnsureTarget::Runtime => write!(f, "runtime"),
            EnsureTarget::Assets => write!(f, "assets"),
        }
    }
}

/// Coarse classification used by the attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Integrity,
    Extract,
    Other,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{0}")]
    Msg(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Net(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("timed out downloading {url}")]
    Timeout { url: String },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("could not ensure {target}: {source}")]
    Ensure {
        target: EnsureTarget,
        #[source]
        source: Box<UpdateError>,
    },
}

impl UpdateError {
    pub fn ensure(target: EnsureTarget, source: UpdateError) -> Self {
        UpdateError::Ensure {
            target,
            source: Box::new(source),
        }
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, UpdateError::Status { status: 400, .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Net(_) | UpdateError::Status { .. } | UpdateError::Timeout { .. } => {
                ErrorKind::Network
            }
            UpdateError::Integrity(_) => ErrorKind::Integrity,
            UpdateError::Zip(_) => ErrorKind::Extract,
            UpdateError::Ensure { source, .. } => source.kind(),
            UpdateError::Msg(_) | UpdateError::Io(_) | UpdateError::Serde(_) => ErrorKind::Other,
        }
    }
}

impl From<anyhow::Error> for UpdateError {
    fn from(e: anyhow::Error) -> Self {
        UpdateError::Msg(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
