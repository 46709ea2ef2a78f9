//! In-order reassembly of downloaded segment files.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::GrabError;

/// Temp path of one downloaded segment: `tmp_dir/<clean-filename>_<pos>`.
pub fn segment_tmp_path(tmp_dir: &Path, filename: &str, pos: usize) -> PathBuf {
    tmp_dir.join(format!("{}_{pos}", m3u8::clean_filename(filename)))
}

/// Concatenates segments `0..count` of `filename` into `output`, deleting
/// each temp file once appended. Missing positions are skipped with a
/// warning, a gap rather than a failure. Any I/O error aborts with the remaining
/// segments left on disk for diagnosis.
///
/// Returns the number of bytes written.
pub async fn assemble(
    tmp_dir: &Path,
    filename: &str,
    count: usize,
    output: &Path,
) -> Result<u64, GrabError> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| GrabError::Assemble(format!("failed to create {}: {e}", parent.display())))?;
    }
    let mut out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await
        .map_err(|e| GrabError::Assemble(format!("failed to create {}: {e}", output.display())))?;

    debug!(output = %output.display(), count, "reassembling segments");

    let mut written: u64 = 0;
    for pos in 0..count {
        let segment = segment_tmp_path(tmp_dir, filename, pos);
        if !fs::try_exists(&segment).await.unwrap_or(false) {
            warn!(segment = %segment.display(), "segment missing, skipping");
            continue;
        }

        let mut input = File::open(&segment)
            .await
            .map_err(|e| GrabError::Assemble(format!("failed to open {}: {e}", segment.display())))?;
        written += io::copy(&mut input, &mut out)
            .await
            .map_err(|e| GrabError::Assemble(format!("failed to append {}: {e}", segment.display())))?;
        out.sync_all()
            .await
            .map_err(|e| GrabError::Assemble(e.to_string()))?;

        if let Err(e) = fs::remove_file(&segment).await {
            warn!(segment = %segment.display(), error = %e, "failed to remove segment");
        }
    }

    out.flush()
        .await
        .map_err(|e| GrabError::Assemble(e.to_string()))?;
    info!(output = %output.display(), written, "assembly complete");
    Ok(written)
}
