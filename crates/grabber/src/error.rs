use std::sync::Arc;

use m3u8::M3u8Error;

/// Engine error taxonomy. Cloneable so a single failure can be recorded on a
/// job group and also surfaced to the submitter.
#[derive(Debug, thiserror::Error, Clone)]
pub enum GrabError {
    #[error("network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("invalid playlist: {0}")]
    InvalidPlaylist(String),

    #[error("unsupported encryption: {0}")]
    UnsupportedCrypto(String),

    #[error("key fetch failed: {0}")]
    KeyFetchFailed(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("assembly failed: {0}")]
    Assemble(String),

    #[error("missing external dependency: {0}")]
    DependencyMissing(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("i/o error: {source}")]
    Io {
        #[from]
        source: Arc<std::io::Error>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

// Manual From impls because of the Arc wrapping.
impl From<reqwest::Error> for GrabError {
    fn from(err: reqwest::Error) -> Self {
        GrabError::Network {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for GrabError {
    fn from(err: std::io::Error) -> Self {
        GrabError::Io {
            source: Arc::new(err),
        }
    }
}

impl From<M3u8Error> for GrabError {
    fn from(err: M3u8Error) -> Self {
        GrabError::InvalidPlaylist(err.to_string())
    }
}
