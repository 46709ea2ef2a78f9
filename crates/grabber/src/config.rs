use std::path::PathBuf;
use std::time::Duration;

use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Configurable options for the download engine.
#[derive(Debug, Clone)]
pub struct GrabberConfig {
    /// Number of concurrently running segment jobs.
    pub segment_workers: usize,

    /// Folder holding per-segment temp files during a download.
    pub tmp_dir: PathBuf,

    /// Total deadline for a single HTTP request.
    pub request_timeout: Duration,

    /// Time to establish the initial connection.
    pub connect_timeout: Duration,

    /// Deadline for downloading one whole presentation; on expiry the
    /// attempt is abandoned and retried.
    pub download_timeout: Duration,

    /// Whole-presentation attempts before giving up.
    pub download_retries: u32,

    /// Attempts when fetching a decryption key.
    pub key_retries: u32,

    /// Base delay for the key-fetch exponential backoff.
    pub key_retry_delay_base: Duration,

    /// User agent string for all requests.
    pub user_agent: String,

    /// Proxy configuration (optional).
    pub proxy: Option<ProxyConfig>,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            segment_workers: 4,
            tmp_dir: std::env::temp_dir().join("hlsget"),
            request_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(1),
            download_timeout: Duration::from_secs(12 * 60),
            download_retries: 3,
            key_retries: 5,
            key_retry_delay_base: Duration::from_millis(200),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
        }
    }
}
