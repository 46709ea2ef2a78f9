//! Job variants flowing through the worker pool.

use std::path::PathBuf;

use m3u8::CryptoMethod;
use tokio::sync::oneshot;

use crate::error::GrabError;
use crate::wait::{ErrorSlot, WaitGroup};

/// Encryption parameters resolved for a playlist, shared by all of its
/// segment jobs.
#[derive(Debug, Clone)]
pub struct SegmentCrypto {
    pub method: CryptoMethod,
    /// 16-byte AES-128 key.
    pub key: [u8; 16],
    /// Declared IV; when absent, derived from the segment position.
    pub iv: Option<[u8; 16]>,
    /// Set for `skd://` (FairPlay) keys: decryption must be refused.
    pub drm: bool,
}

/// A unit of work for the pool. List jobs arrive from submitters; the master
/// worker fans the rest out onto the segment channel.
pub enum Job {
    List(ListJob),
    Segment(SegmentJob),
    Subtitles(SubtitleJob),
    MasterAudio(MasterAudioJob),
}

/// Download a whole presentation: resolve, fetch, assemble, mux.
pub struct ListJob {
    pub url: String,
    pub dest_path: PathBuf,
    pub filename: String,
    /// Leave the intermediate artifacts in place instead of muxing.
    pub skip_mux: bool,
    /// Download subtitle renditions only.
    pub subs_only: bool,
    /// Completion signal back to the submitter, carrying the first error.
    pub ticket: Option<oneshot::Sender<Result<(), GrabError>>>,
}

/// Download one media segment into the temp folder.
pub struct SegmentJob {
    pub url: String,
    /// Position of the segment within its playlist, 0-indexed.
    pub pos: usize,
    pub dest_path: PathBuf,
    pub filename: String,
    /// Audio segments get rewrapped ADTS→AAC after download.
    pub audio: bool,
    pub crypto: Option<SegmentCrypto>,
    pub group: WaitGroup,
    pub errors: ErrorSlot,
}

/// Collect one subtitle rendition into a single SRT file.
pub struct SubtitleJob {
    pub url: String,
    pub dest_path: PathBuf,
    pub filename: String,
    /// Explicit output path; defaults to `<dest_path>/<filename>.srt`.
    pub absolute_path: Option<PathBuf>,
    pub group: WaitGroup,
    pub errors: ErrorSlot,
}

/// Download an alternate audio rendition: expands into per-segment jobs and
/// assembles them at `absolute_path`.
pub struct MasterAudioJob {
    pub url: String,
    pub dest_path: PathBuf,
    pub filename: String,
    pub absolute_path: PathBuf,
    /// Crypto inherited from the master playlist; the audio playlist's own
    /// key wins when both are present.
    pub crypto: Option<SegmentCrypto>,
    pub group: WaitGroup,
    pub errors: ErrorSlot,
}

impl SubtitleJob {
    /// Where the SRT lands.
    pub fn output_path(&self) -> PathBuf {
        self.absolute_path
            .clone()
            .unwrap_or_else(|| self.dest_path.join(format!("{}.srt", self.filename)))
    }
}
