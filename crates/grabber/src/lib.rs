//! # grabber
//!
//! HLS presentation download engine: resolves master/media playlists,
//! downloads and decrypts segments through a bounded worker pool, collects
//! segmented subtitles, reassembles per-track intermediate files and hands
//! them to the external media tool for the final mux.

pub mod assembler;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod job;
pub mod lang;
pub mod mux;
pub mod proxy;
pub mod resolver;
pub mod subtitle;
pub mod wait;
pub mod worker;

pub use config::GrabberConfig;
pub use engine::{DownloadRequest, Grabber};
pub use error::GrabError;
pub use job::{Job, ListJob, MasterAudioJob, SegmentCrypto, SegmentJob, SubtitleJob};
pub use proxy::{ProxyConfig, ProxyType};
pub use resolver::{PlaylistResolver, ResolvedPlaylist};
pub use worker::Pool;
