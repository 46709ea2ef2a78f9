//! Per-segment download, decryption and post-processing.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::assembler::segment_tmp_path;
use crate::config::GrabberConfig;
use crate::crypto::{decrypt_stream, msn_iv};
use crate::error::GrabError;
use crate::job::SegmentJob;
use crate::mux;

pub struct SegmentFetcher {
    client: Client,
    config: Arc<GrabberConfig>,
}

impl SegmentFetcher {
    pub fn new(client: Client, config: Arc<GrabberConfig>) -> Self {
        Self { client, config }
    }

    /// Downloads one segment into the temp folder, decrypting in place when
    /// a key applies and rewrapping audio segments.
    ///
    /// A non-200 answer is logged and tolerated; the assembler skips the
    /// missing position later. Everything else that goes wrong is a real
    /// failure for the job.
    pub async fn download(&self, job: &SegmentJob) -> Result<(), GrabError> {
        debug!(filename = %job.filename, pos = job.pos, "downloading segment");

        let response = match self.client.get(&job.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %job.url, error = %e, "failed to download segment, leaving a gap");
                return Ok(());
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            warn!(url = %job.url, status = %response.status(), "segment request refused, leaving a gap");
            return Ok(());
        }

        let destination = segment_tmp_path(&self.config.tmp_dir, &job.filename, job.pos);
        if fs::try_exists(&destination).await.unwrap_or(false) {
            // resumed download, the segment is already on disk
            return Ok(());
        }

        fs::create_dir_all(&self.config.tmp_dir).await?;
        fs::create_dir_all(&job.dest_path).await?;

        let mut out = fs::File::create(&destination).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;
        drop(out);

        if let Some(crypto) = &job.crypto {
            if crypto.drm {
                return Err(GrabError::Decrypt(
                    "this isn't an AES-128 encrypted stream but FairPlay DRM".to_string(),
                ));
            }
            let iv = crypto.iv.unwrap_or_else(|| msn_iv(job.pos));
            decrypt_in_place(&destination, &crypto.key, &iv).await?;
        }

        if job.audio {
            // ADTS frames can't be concatenated byte-wise; rewrap as AAC
            // while the segment is still a standalone file.
            mux::adts_to_aac(&destination).await?;
        }

        Ok(())
    }
}

/// Decrypts `segment` through a `.dec` sibling, then moves the decrypted
/// file over the original.
async fn decrypt_in_place(segment: &Path, key: &[u8; 16], iv: &[u8; 16]) -> Result<(), GrabError> {
    let segment = segment.to_path_buf();
    let key = *key;
    let iv = *iv;

    tokio::task::spawn_blocking(move || -> Result<(), GrabError> {
        let decrypted_path = {
            let mut s = segment.as_os_str().to_os_string();
            s.push(".dec");
            std::path::PathBuf::from(s)
        };

        let mut input = std::fs::File::open(&segment)?;
        let mut output = std::fs::File::create(&decrypted_path)?;
        decrypt_stream(&mut input, &mut output, &key, &iv)?;
        output.sync_all().map_err(GrabError::from)?;
        drop(output);
        drop(input);

        std::fs::remove_file(&segment)?;
        std::fs::rename(&decrypted_path, &segment)?;
        Ok(())
    })
    .await
    .map_err(|e| GrabError::Decrypt(format!("decryption task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::Aes128;
    use cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

    #[tokio::test]
    async fn decrypt_in_place_replaces_the_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg_0");

        let key = *b"0123456789abcdef";
        let iv = msn_iv(0);
        let plain = b"in place decryption test payload".to_vec();
        let mut buf = vec![0u8; plain.len() + 16];
        let ciphertext = cbc::Encryptor::<Aes128>::new(&key.into(), &iv.into())
            .encrypt_padded_b2b_mut::<Pkcs7>(&plain, &mut buf)
            .unwrap()
            .to_vec();
        fs::write(&path, &ciphertext).await.unwrap();

        decrypt_in_place(&path, &key, &iv).await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), plain);
        let mut dec = path.as_os_str().to_os_string();
        dec.push(".dec");
        assert!(!std::path::PathBuf::from(dec).exists());
    }
}
