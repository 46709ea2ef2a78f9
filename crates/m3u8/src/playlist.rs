//! Playlist parsing: turns raw M3U8 text into a [`Playlist`].

use crate::error::M3u8Error;
use crate::key::{CryptoMethod, KeyTag};
use crate::media::{AUDIO_MARKER, AudioStream, SUBTITLES_MARKER, SubtitleStream};
use crate::rendition::{Rendition, STREAM_INF_MARKER};
use crate::url_util::resolve_uri;

const MAP_MARKER: &str = "#EXT-X-MAP:";
const MEDIA_SEQUENCE_MARKER: &str = "#EXT-X-MEDIA-SEQUENCE:";

/// A parsed M3U8 playlist. All URIs are resolved against the playlist URL.
///
/// A master playlist carries `renditions` (and usually alternate
/// `audio_streams`/`subtitle_streams`); a media playlist carries `segments`.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    /// Absolute source URL of this playlist.
    pub url: String,
    /// Ordered absolute segment URLs, position-indexed from 0.
    pub segments: Vec<String>,
    /// Initialization-segment URI from `#EXT-X-MAP`, if declared.
    pub map_uri: Option<String>,
    /// Declared `#EXT-X-MEDIA-SEQUENCE` (defaults to 0). Decryption IVs are
    /// derived from sequential position; this is kept for review against
    /// playlists that declare a non-zero base.
    pub media_sequence: u64,
    /// The `#EXT-X-KEY` tag, if present.
    pub key: Option<KeyTag>,
    /// Variant streams of a master playlist.
    pub renditions: Vec<Rendition>,
    /// Alternate audio renditions.
    pub audio_streams: Vec<AudioStream>,
    /// Subtitle renditions.
    pub subtitle_streams: Vec<SubtitleStream>,
}

impl Playlist {
    /// Parses `body` fetched from `url`.
    ///
    /// The first non-empty line must begin with `#EXTM3U`. A
    /// `#EXT-X-STREAM-INF` tag pairs atomically with the following non-blank
    /// line; a missing pair line is an error. Unrecognized `#` lines are
    /// ignored and any other non-blank line is a segment URI.
    pub fn parse(url: &str, body: &str) -> Result<Playlist, M3u8Error> {
        let mut lines = body.lines().map(str::trim);

        match lines.find(|l| !l.is_empty()) {
            Some(first) if first.starts_with("#EXTM3U") => {}
            _ => {
                return Err(M3u8Error::InvalidPlaylist(
                    "missing #EXTM3U header".to_string(),
                ));
            }
        }

        let mut playlist = Playlist {
            url: url.to_string(),
            ..Playlist::default()
        };

        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }

            if line.starts_with(STREAM_INF_MARKER) {
                let mut rendition = Rendition::from_line(line).unwrap_or_default();
                let uri = lines
                    .by_ref()
                    .find(|l| !l.is_empty())
                    .ok_or_else(|| {
                        M3u8Error::InvalidPlaylist(
                            "#EXT-X-STREAM-INF with no rendition URI".to_string(),
                        )
                    })?;
                rendition.url = resolve_uri(uri, url);
                playlist.renditions.push(rendition);
                continue;
            }

            if let Some(parsed) = KeyTag::from_line(line) {
                let mut tag = parsed?;
                if let Some(uri) = tag.uri.take() {
                    // skd:// and other scheme'd key URIs must survive as-is
                    if uri.contains("://") {
                        tag.uri = Some(uri);
                    } else {
                        tag.uri = Some(resolve_uri(&uri, url));
                    }
                }
                playlist.key = Some(tag);
                continue;
            }

            if line.starts_with(AUDIO_MARKER) {
                if let Some(mut stream) = AudioStream::from_line(line) {
                    if !stream.uri.is_empty() {
                        stream.uri = resolve_uri(&stream.uri, url);
                    }
                    playlist.audio_streams.push(stream);
                }
                continue;
            }

            if line.starts_with(SUBTITLES_MARKER) {
                if let Some(mut stream) = SubtitleStream::from_line(line) {
                    if !stream.uri.is_empty() {
                        stream.uri = resolve_uri(&stream.uri, url);
                    }
                    playlist.subtitle_streams.push(stream);
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix(MAP_MARKER) {
                for (key, value) in crate::attr::decode_attribute_list(rest) {
                    if key == "URI" {
                        playlist.map_uri = Some(resolve_uri(&value, url));
                    }
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix(MEDIA_SEQUENCE_MARKER) {
                playlist.media_sequence = rest.trim().parse().unwrap_or(0);
                continue;
            }

            if line.starts_with('#') {
                // #EXTINF, #EXT-X-BYTERANGE and friends: recognized as
                // comments, not honored.
                continue;
            }

            playlist.segments.push(resolve_uri(line, url));
        }

        Ok(playlist)
    }

    /// A master playlist lists renditions instead of segments.
    pub fn is_master(&self) -> bool {
        !self.renditions.is_empty()
    }

    pub fn crypto_method(&self) -> CryptoMethod {
        self.key
            .as_ref()
            .map(|k| k.method.clone())
            .unwrap_or_default()
    }

    /// The default alternate audio stream, if one is declared with a URI.
    pub fn default_audio_stream(&self) -> Option<&AudioStream> {
        self.audio_streams
            .iter()
            .find(|s| s.default && !s.uri.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://h/p/m.m3u8";

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(
            Playlist::parse(BASE, "segment0.ts\n"),
            Err(M3u8Error::InvalidPlaylist(_))
        ));
        assert!(matches!(
            Playlist::parse(BASE, ""),
            Err(M3u8Error::InvalidPlaylist(_))
        ));
    }

    #[test]
    fn parses_media_playlist_segments_in_order() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\na.ts\n#EXTINF:6,\nb.ts\n#EXTINF:6,\nc.ts\n#EXT-X-ENDLIST\n";
        let p = Playlist::parse(BASE, body).unwrap();
        assert!(!p.is_master());
        assert_eq!(
            p.segments,
            vec!["http://h/p/a.ts", "http://h/p/b.ts", "http://h/p/c.ts"]
        );
        assert!(p.segments.iter().all(|s| s.starts_with("http")));
    }

    #[test]
    fn pairs_stream_inf_with_following_line() {
        let body = "#EXTM3U\n\
                    #EXT-X-STREAM-INF:BANDWIDTH=500000\n\
                    low.m3u8\n\
                    #EXT-X-STREAM-INF:BANDWIDTH=2000000\n\
                    \n\
                    high.m3u8\n";
        let p = Playlist::parse(BASE, body).unwrap();
        assert!(p.is_master());
        assert_eq!(p.renditions.len(), 2);
        assert_eq!(p.renditions[0].url, "http://h/p/low.m3u8");
        assert_eq!(p.renditions[1].url, "http://h/p/high.m3u8");
        assert!(p.segments.is_empty());
    }

    #[test]
    fn truncated_stream_inf_is_an_error() {
        let body = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=500000\n";
        assert!(matches!(
            Playlist::parse(BASE, body),
            Err(M3u8Error::InvalidPlaylist(_))
        ));
    }

    #[test]
    fn captures_key_and_media_tags() {
        let body = "#EXTM3U\n\
                    #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                    #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"fr\",LANGUAGE=\"fr\",DEFAULT=YES,URI=\"audio.m3u8\"\n\
                    #EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"fr\",LANGUAGE=\"fr\",URI=\"subs.m3u8\"\n\
                    #EXTINF:6,\n\
                    a.ts\n";
        let p = Playlist::parse(BASE, body).unwrap();
        let key = p.key.as_ref().unwrap();
        assert_eq!(key.method, CryptoMethod::Aes128);
        assert_eq!(key.uri.as_deref(), Some("http://h/p/key.bin"));
        assert!(key.raw_line.starts_with("#EXT-X-KEY:"));
        assert_eq!(p.audio_streams[0].uri, "http://h/p/audio.m3u8");
        assert_eq!(p.subtitle_streams[0].uri, "http://h/p/subs.m3u8");
        assert!(p.default_audio_stream().is_some());
    }

    #[test]
    fn skd_key_uri_is_not_resolved() {
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"skd://asset-id\"\na.ts\n";
        let p = Playlist::parse(BASE, body).unwrap();
        assert_eq!(p.key.unwrap().uri.as_deref(), Some("skd://asset-id"));
    }

    #[test]
    fn map_uri_is_captured() {
        let body = "#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:6,\na.m4s\n";
        let p = Playlist::parse(BASE, body).unwrap();
        assert_eq!(p.map_uri.as_deref(), Some("http://h/p/init.mp4"));
    }

    #[test]
    fn media_sequence_is_captured() {
        let body = "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:271\n#EXTINF:6,\na.ts\n";
        let p = Playlist::parse(BASE, body).unwrap();
        assert_eq!(p.media_sequence, 271);

        let body = "#EXTM3U\n#EXTINF:6,\na.ts\n";
        assert_eq!(Playlist::parse(BASE, body).unwrap().media_sequence, 0);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let body = "#EXTM3U\n#EXT-X-VERSION:6\n#EXT-X-BYTERANGE:75232@0\n#EXTINF:6,\na.ts\n";
        let p = Playlist::parse(BASE, body).unwrap();
        assert_eq!(p.segments.len(), 1);
    }
}
