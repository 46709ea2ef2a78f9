// M3U8 (HTTP Live Streaming) playlist parser implementation
pub mod attr;
pub mod error;
pub mod key;
pub mod media;
pub mod playlist;
pub mod rendition;
pub mod sanitize;
pub mod url_util;

// Export common types for ease of use
pub use attr::{decode_attribute_list, split_and_trim_comma_list};
pub use error::M3u8Error;
pub use key::{CryptoMethod, KeyTag};
pub use media::{AudioStream, SubtitleStream};
pub use playlist::Playlist;
pub use rendition::Rendition;
pub use sanitize::{clean_filename, clean_path};
pub use url_util::resolve_uri;
