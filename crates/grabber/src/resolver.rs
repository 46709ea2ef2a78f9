//! Playlist resolution: fetch, follow master→media recursion, resolve
//! encryption keys.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use m3u8::{AudioStream, CryptoMethod, KeyTag, Playlist, SubtitleStream};
use reqwest::Client;
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use tracing::{debug, warn};

use crate::config::GrabberConfig;
use crate::error::GrabError;
use crate::job::SegmentCrypto;

/// Hook for operators whose keys need post-processing before use (the
/// SAMPLE-AES escape hatch). Receives the fetched key bytes and the key tag,
/// returns the 16 bytes to decrypt with.
pub type KeyProcessor =
    Arc<dyn Fn(&Bytes, &KeyTag) -> Result<[u8; 16], GrabError> + Send + Sync>;

/// A playlist with its master→media recursion followed and its key fetched.
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    /// URL of the media playlist the segments came from.
    pub url: String,
    /// Ordered absolute segment URLs.
    pub segments: Vec<String>,
    /// Initialization-segment URI, if declared.
    pub map_uri: Option<String>,
    /// Declared media sequence base of the media playlist.
    pub media_sequence: u64,
    /// The raw `#EXT-X-KEY` line, for diagnostics.
    pub raw_key_line: Option<String>,
    /// Resolved encryption parameters.
    pub crypto: Option<SegmentCrypto>,
    /// Alternate audio renditions, preserved from the master playlist.
    pub audio_streams: Vec<AudioStream>,
    /// Subtitle renditions: the master's plus any the media playlist adds.
    pub subtitle_streams: Vec<SubtitleStream>,
}

#[derive(Clone)]
pub struct PlaylistResolver {
    client: Client,
    config: Arc<GrabberConfig>,
    key_processor: Option<KeyProcessor>,
}

/// Master playlists pointing at further master playlists are rare but legal;
/// past this depth the playlist is considered cyclic.
const MAX_RECURSION: usize = 8;

impl PlaylistResolver {
    pub fn new(client: Client, config: Arc<GrabberConfig>) -> Self {
        Self {
            client,
            config,
            key_processor: None,
        }
    }

    /// Registers a key processor; without one, SAMPLE-AES playlists are
    /// rejected before any key fetch.
    pub fn with_key_processor(mut self, processor: KeyProcessor) -> Self {
        self.key_processor = Some(processor);
        self
    }

    /// Fetches and fully resolves the playlist at `url`: the best rendition
    /// of a master playlist is followed, audio/subtitle declarations are
    /// preserved across the recursion, and the encryption key is retrieved.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedPlaylist, GrabError> {
        self.resolve_at_depth(url.to_string(), 0).await
    }

    fn resolve_at_depth(
        &self,
        url: String,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<ResolvedPlaylist, GrabError>> + Send + '_>> {
        Box::pin(async move {
            if depth > MAX_RECURSION {
                return Err(GrabError::InvalidPlaylist(format!(
                    "master playlist recursion exceeded {MAX_RECURSION} levels at {url}"
                )));
            }

            let body = self.fetch_playlist_text(&url).await?;
            let playlist = Playlist::parse(&url, &body)?;

            if playlist.is_master() {
                let mut renditions = playlist.renditions.clone();
                renditions.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
                let best = &renditions[0];
                debug!(bandwidth = best.bandwidth, url = %best.url, "selected rendition");

                // The master holds the alternate-stream declarations; the
                // media rendition rarely repeats them. Hold on to them and
                // merge the recursion's results in.
                let inner = self.resolve_at_depth(best.url.clone(), depth + 1).await?;

                let mut subtitle_streams = playlist.subtitle_streams;
                subtitle_streams.extend(inner.subtitle_streams);

                return Ok(ResolvedPlaylist {
                    url: inner.url,
                    segments: inner.segments,
                    map_uri: inner.map_uri,
                    media_sequence: inner.media_sequence,
                    raw_key_line: inner.raw_key_line,
                    crypto: inner.crypto,
                    audio_streams: playlist.audio_streams,
                    subtitle_streams,
                });
            }

            if playlist.segments.is_empty() {
                return Err(GrabError::InvalidPlaylist(format!(
                    "no segments or renditions found at {url}"
                )));
            }

            let crypto = self.resolve_crypto(&playlist).await?;

            Ok(ResolvedPlaylist {
                url: playlist.url,
                segments: playlist.segments,
                map_uri: playlist.map_uri,
                media_sequence: playlist.media_sequence,
                raw_key_line: playlist.key.as_ref().map(|k| k.raw_line.clone()),
                crypto,
                audio_streams: playlist.audio_streams,
                subtitle_streams: playlist.subtitle_streams,
            })
        })
    }

    async fn fetch_playlist_text(&self, url: &str) -> Result<String, GrabError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn resolve_crypto(
        &self,
        playlist: &Playlist,
    ) -> Result<Option<SegmentCrypto>, GrabError> {
        let Some(tag) = &playlist.key else {
            return Ok(None);
        };

        match &tag.method {
            CryptoMethod::None => return Ok(None),
            CryptoMethod::Aes128 => {}
            method => {
                if self.key_processor.is_none() {
                    return Err(GrabError::UnsupportedCrypto(format!(
                        "{} encryption requires a custom key processor",
                        method.as_str()
                    )));
                }
            }
        }

        let uri = tag.uri.as_ref().ok_or_else(|| {
            GrabError::KeyFetchFailed("encrypted playlist declares no key URI".to_string())
        })?;

        if uri.starts_with("skd://") {
            // FairPlay DRM: record a placeholder so the rejection happens at
            // decrypt time, with the raw key line available for diagnostics.
            warn!(uri = %uri, "skd:// key URI, content is DRM protected");
            return Ok(Some(SegmentCrypto {
                method: tag.method.clone(),
                key: [0u8; 16],
                iv: tag.iv,
                drm: true,
            }));
        }

        let bytes = self.fetch_key(uri, &playlist.url).await?;
        let key = match &self.key_processor {
            Some(processor) => processor(&bytes, tag)?,
            None => bytes.as_ref().try_into().map_err(|_| {
                GrabError::KeyFetchFailed(format!(
                    "key from {uri} has length {}, expected 16",
                    bytes.len()
                ))
            })?,
        };

        Ok(Some(SegmentCrypto {
            method: tag.method.clone(),
            key,
            iv: tag.iv,
            drm: false,
        }))
    }

    /// Fetches the key with the playlist's origin headers so origin-scoped
    /// key servers answer. Server errors are retried with backoff; client
    /// errors are final.
    async fn fetch_key(&self, key_uri: &str, playlist_url: &str) -> Result<Bytes, GrabError> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = self
                .client
                .get(key_uri)
                .header(ACCEPT, "text/plain")
                .header(ORIGIN, playlist_url)
                .header(REFERER, playlist_url)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.bytes().await?);
                    }
                    if status.is_client_error() {
                        return Err(GrabError::KeyFetchFailed(format!(
                            "key server answered {status} for {key_uri}"
                        )));
                    }
                    if attempts >= self.config.key_retries {
                        return Err(GrabError::KeyFetchFailed(format!(
                            "max retries ({}) exceeded for key {key_uri}, last status {status}",
                            self.config.key_retries
                        )));
                    }
                }
                Err(e) => {
                    if attempts >= self.config.key_retries {
                        return Err(GrabError::KeyFetchFailed(format!(
                            "max retries ({}) exceeded for key {key_uri}: {e}",
                            self.config.key_retries
                        )));
                    }
                }
            }

            let delay = self.config.key_retry_delay_base * 2_u32.pow(attempts.saturating_sub(1));
            tokio::time::sleep(delay).await;
        }
    }
}
