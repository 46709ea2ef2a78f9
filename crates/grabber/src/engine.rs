//! The top-level engine: owns the pool and the shared HTTP client, wraps
//! submissions in the whole-presentation timeout and retry policy.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::GrabberConfig;
use crate::error::GrabError;
use crate::http::create_client;
use crate::job::ListJob;
use crate::worker::Pool;

/// A request to download one presentation.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// URL of the master or media playlist.
    pub url: String,
    /// Directory receiving the final artifacts.
    pub dest_path: PathBuf,
    /// Output name, without extension.
    pub filename: String,
    /// Leave the intermediate TS/audio/subtitle files instead of muxing.
    pub skip_mux: bool,
    /// Download subtitle renditions only.
    pub subs_only: bool,
}

/// The download engine. Construction spawns the worker pool; shutdown
/// drains it.
pub struct Grabber {
    pool: Pool,
    config: Arc<GrabberConfig>,
}

impl Grabber {
    pub fn new(config: GrabberConfig) -> Result<Grabber, GrabError> {
        let config = Arc::new(config);
        let client = create_client(&config)?;
        let pool = Pool::spawn(Arc::clone(&config), client);
        Ok(Grabber { pool, config })
    }

    /// Downloads one presentation, retrying whole attempts on error or on
    /// the per-presentation deadline. In-flight work of a timed-out attempt
    /// is not cancelled; it keeps its temp files, which the next attempt
    /// resumes from.
    pub async fn download(&self, request: DownloadRequest) -> Result<(), GrabError> {
        let mut last_error = GrabError::Timeout(format!("downloading {} timed out", request.filename));

        for attempt in 1..=self.config.download_retries {
            let ticket = self.pool.submit(ListJob {
                url: request.url.clone(),
                dest_path: request.dest_path.clone(),
                filename: request.filename.clone(),
                skip_mux: request.skip_mux,
                subs_only: request.subs_only,
                ticket: None,
            })?;

            match tokio::time::timeout(self.config.download_timeout, ticket).await {
                Ok(Ok(result)) => match result {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(attempt, error = %e, "download attempt failed");
                        last_error = e;
                    }
                },
                Ok(Err(_recv)) => {
                    return Err(GrabError::Config(
                        "worker pool dropped the job".to_string(),
                    ));
                }
                Err(_elapsed) => {
                    let remaining = self.config.download_retries - attempt;
                    info!(
                        filename = %request.filename,
                        remaining, "download timed out, retrying"
                    );
                    last_error =
                        GrabError::Timeout(format!("downloading {} timed out", request.filename));
                }
            }
        }

        Err(last_error)
    }

    /// Closes the pool and waits for the workers to drain.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
