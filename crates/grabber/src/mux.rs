//! External media-tool invocation: final muxing and ADTS rewrapping.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::GrabError;
use crate::lang::{audio_track_meta, iso639_2, subtitle_lang};

const MEDIA_TOOL: &str = "ffmpeg";

/// Locates the external media tool on `PATH`.
pub async fn find_media_tool() -> Result<PathBuf, GrabError> {
    let locator = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(locator)
        .arg(MEDIA_TOOL)
        .output()
        .await
        .map_err(|e| GrabError::DependencyMissing(format!("{locator} failed: {e}")))?;

    if !output.status.success() {
        return Err(GrabError::DependencyMissing(format!(
            "{MEDIA_TOOL} wasn't found on your system, it is required to convert video files"
        )));
    }

    let path = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if path.is_empty() {
        return Err(GrabError::DependencyMissing(format!(
            "{MEDIA_TOOL} wasn't found on your system"
        )));
    }
    Ok(PathBuf::from(path))
}

/// Inputs for the final mux: one video TS plus optional audio and subtitle
/// artifacts produced by the pipeline.
#[derive(Debug, Default)]
pub struct MuxInputs {
    pub video: PathBuf,
    pub audio: Vec<PathBuf>,
    pub subtitles: Vec<PathBuf>,
}

impl MuxInputs {
    fn input_count(&self) -> usize {
        1 + self.audio.len() + self.subtitles.len()
    }
}

/// Builds the muxer argument vector: stream copy for video and audio, the
/// ADTS bitstream filter, per-track language metadata and `mov_text` when
/// subtitles are present.
pub fn mux_args(inputs: &MuxInputs, output: &Path) -> Vec<String> {
    let mut args = vec!["-y".to_string()];

    args.extend(["-i".to_string(), inputs.video.display().to_string()]);
    for audio in &inputs.audio {
        args.extend(["-i".to_string(), audio.display().to_string()]);
    }
    for subtitle in &inputs.subtitles {
        args.extend(["-i".to_string(), subtitle.display().to_string()]);
    }

    if inputs.input_count() > 2 {
        for i in 0..inputs.input_count() {
            args.extend(["-map".to_string(), i.to_string()]);
        }
    }

    for (idx, audio) in inputs.audio.iter().enumerate() {
        let stem = audio.file_name().unwrap_or_default().to_string_lossy();
        let (title, lang) = audio_track_meta(&stem).unwrap_or(("", ""));
        args.extend([
            format!("-metadata:s:a:{idx}"),
            format!("language={}", iso639_2(lang)),
        ]);
        if !title.is_empty() {
            args.extend([format!("-metadata:s:a:{idx}"), format!("title={title}")]);
        }
    }

    for (idx, subtitle) in inputs.subtitles.iter().enumerate() {
        let name = subtitle.file_name().unwrap_or_default().to_string_lossy();
        let lang = subtitle_lang(&name).unwrap_or("");
        args.extend([
            format!("-metadata:s:s:{idx}"),
            format!("language={}", iso639_2(lang)),
        ]);
    }
    if !inputs.subtitles.is_empty() {
        args.extend(["-c:s".to_string(), "mov_text".to_string()]);
    }

    args.extend(
        ["-vcodec", "copy", "-acodec", "copy", "-bsf:a", "aac_adtstoasc"]
            .map(str::to_string),
    );
    args.push(output.display().to_string());
    args
}

/// Muxes the intermediate artifacts into the final container.
pub async fn mux(inputs: &MuxInputs, output: &Path) -> Result<(), GrabError> {
    let tool = find_media_tool().await?;
    let args = mux_args(inputs, output);
    debug!(tool = %tool.display(), ?args, "invoking muxer");

    let status = Command::new(&tool)
        .args(&args)
        .status()
        .await
        .map_err(|e| GrabError::Assemble(format!("failed to run {}: {e}", tool.display())))?;

    if !status.success() {
        error!(%status, "muxer exited with failure");
        return Err(GrabError::Assemble(format!(
            "media tool exited with status {status}"
        )));
    }

    info!(output = %output.display(), "mux complete");
    Ok(())
}

/// Rewraps an ADTS audio segment as raw AAC in place. ADTS frames cannot be
/// concatenated byte-wise, so every audio segment goes through this before
/// assembly.
pub async fn adts_to_aac(segment: &Path) -> Result<(), GrabError> {
    let tool = find_media_tool().await?;
    // appended rather than with_extension: segment names may contain dots
    let converted = PathBuf::from(format!("{}.aac", segment.display()));

    let status = Command::new(&tool)
        .arg("-y")
        .arg("-i")
        .arg(segment)
        .args(["-codec", "copy", "-bsf:a", "aac_adtstoasc"])
        .arg(&converted)
        .status()
        .await
        .map_err(|e| GrabError::Decrypt(format!("failed to run {}: {e}", tool.display())))?;

    if !status.success() {
        return Err(GrabError::Assemble(format!(
            "audio rewrap exited with status {status}"
        )));
    }

    tokio::fs::remove_file(segment).await?;
    tokio::fs::rename(&converted, segment).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_video_keeps_argv_minimal() {
        let inputs = MuxInputs {
            video: PathBuf::from("/d/movie.ts"),
            ..MuxInputs::default()
        };
        let args = mux_args(&inputs, Path::new("/d/movie.mp4"));
        assert_eq!(
            args,
            vec![
                "-y", "-i", "/d/movie.ts", "-vcodec", "copy", "-acodec", "copy", "-bsf:a",
                "aac_adtstoasc", "/d/movie.mp4",
            ]
        );
    }

    #[test]
    fn audio_and_subs_get_maps_and_metadata() {
        let inputs = MuxInputs {
            video: PathBuf::from("/d/movie.ts"),
            audio: vec![PathBuf::from("/d/movie_audio_French_fr")],
            subtitles: vec![PathBuf::from("/d/movie_fr.srt")],
        };
        let args = mux_args(&inputs, Path::new("/d/movie.mp4"));

        let maps: Vec<_> = args.iter().filter(|a| a.as_str() == "-map").collect();
        assert_eq!(maps.len(), 3);
        assert!(args.contains(&"-metadata:s:a:0".to_string()));
        assert!(args.contains(&"language=fre".to_string()));
        assert!(args.contains(&"title=French".to_string()));
        assert!(args.contains(&"-metadata:s:s:0".to_string()));
        assert!(args.contains(&"-c:s".to_string()));
        assert!(args.contains(&"mov_text".to_string()));
        assert_eq!(args.last().unwrap(), "/d/movie.mp4");
    }

    #[test]
    fn two_inputs_skip_explicit_maps() {
        let inputs = MuxInputs {
            video: PathBuf::from("/d/movie.ts"),
            audio: vec![PathBuf::from("/d/movie_audio_Main_en")],
            ..MuxInputs::default()
        };
        let args = mux_args(&inputs, Path::new("/d/movie.mp4"));
        assert!(!args.iter().any(|a| a == "-map"));
    }
}
