use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum M3u8Error {
    /// The body is not an M3U8 playlist (missing `#EXTM3U`) or is
    /// structurally broken (e.g. a `#EXT-X-STREAM-INF` with no URI line).
    #[error("invalid playlist: {0}")]
    InvalidPlaylist(String),

    #[error("invalid attribute {name}: {reason}")]
    InvalidAttribute { name: String, reason: String },
}
