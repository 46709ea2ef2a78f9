//! Segmented-WebVTT collection: merge all cues, realign to time zero, emit
//! one SRT per rendition.

use std::fmt::Write as _;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::GrabError;
use crate::job::SubtitleJob;
use crate::resolver::PlaylistResolver;

/// A single subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// Parses WebVTT text into cues. Malformed blocks are skipped; NOTE, STYLE
/// and REGION blocks are ignored. Cue settings after the timing line are
/// dropped.
pub fn parse_webvtt(body: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut lines = body.lines().map(str::trim_end).peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with("WEBVTT")
            || trimmed.starts_with("X-TIMESTAMP-MAP")
        {
            continue;
        }
        if trimmed.starts_with("NOTE") || trimmed.starts_with("STYLE") || trimmed.starts_with("REGION")
        {
            // skip the whole block
            for skipped in lines.by_ref() {
                if skipped.trim().is_empty() {
                    break;
                }
            }
            continue;
        }

        // Either a timing line or a cue identifier followed by one.
        let timing = if trimmed.contains("-->") {
            trimmed.to_string()
        } else {
            match lines.next() {
                Some(next) if next.contains("-->") => next.trim().to_string(),
                _ => continue,
            }
        };

        let Some((start, end)) = parse_timing_line(&timing) else {
            continue;
        };

        let mut text = String::new();
        while let Some(&next) = lines.peek() {
            if next.trim().is_empty() {
                break;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(next.trim());
            lines.next();
        }
        if !text.is_empty() {
            cues.push(Cue { start, end, text });
        }
    }

    cues
}

fn parse_timing_line(line: &str) -> Option<(Duration, Duration)> {
    let (start_raw, rest) = line.split_once("-->")?;
    // cue settings may trail the end timestamp
    let end_raw = rest.trim().split_whitespace().next()?;
    Some((
        parse_timestamp(start_raw.trim())?,
        parse_timestamp(end_raw)?,
    ))
}

/// Parses `[HH:]MM:SS.mmm`.
fn parse_timestamp(raw: &str) -> Option<Duration> {
    let (clock, millis_raw) = raw.split_once('.')?;
    let millis: u64 = millis_raw.parse().ok()?;

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, s.parse::<u64>().ok()?),
        [m, s] => (0u64, m.parse::<u64>().ok()?, s.parse::<u64>().ok()?),
        _ => return None,
    };
    Some(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

/// Shifts all cues so the first one starts at zero.
pub fn realign(cues: &mut [Cue]) {
    let Some(offset) = cues.first().map(|c| c.start) else {
        return;
    };
    for cue in cues {
        cue.start = cue.start.saturating_sub(offset);
        cue.end = cue.end.saturating_sub(offset);
    }
}

fn srt_timestamp(d: Duration) -> String {
    let total_millis = d.as_millis();
    let millis = total_millis % 1000;
    let seconds = (total_millis / 1000) % 60;
    let minutes = (total_millis / 60_000) % 60;
    let hours = total_millis / 3_600_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Renders cues as an SRT document.
pub fn to_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(cue.start),
            srt_timestamp(cue.end),
            cue.text
        );
    }
    out
}

/// Collects one subtitle rendition: resolves its playlist, downloads every
/// segment, merges the cues and writes a single SRT.
pub struct SubtitleCollector {
    client: reqwest::Client,
    resolver: PlaylistResolver,
}

impl SubtitleCollector {
    pub fn new(client: reqwest::Client, resolver: PlaylistResolver) -> Self {
        Self { client, resolver }
    }

    /// Returns the path of the written SRT, or `None` when the playlist had
    /// no usable segments.
    pub async fn collect(&self, job: &SubtitleJob) -> Result<Option<std::path::PathBuf>, GrabError> {
        debug!(url = %job.url, "downloading subtitles");
        let playlist = self.resolver.resolve(&job.url).await?;
        if playlist.segments.is_empty() {
            warn!(url = %job.url, "empty subtitle playlist");
            return Ok(None);
        }

        let total = playlist.segments.len();
        let mut cues = Vec::new();
        for (i, segment_url) in playlist.segments.iter().enumerate() {
            if (i + 1) % 10 == 0 {
                debug!("downloading subtitle segment {}/{total}", i + 1);
            }
            let body = match self.fetch_segment(segment_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %segment_url, error = %e, "failed to get subtitle segment, skipping");
                    continue;
                }
            };
            cues.extend(parse_webvtt(&body));
        }

        if cues.is_empty() {
            warn!(url = %job.url, "no cues extracted, not writing a subtitle file");
            return Ok(None);
        }
        realign(&mut cues);

        tokio::fs::create_dir_all(&job.dest_path).await?;
        let output = job.output_path();
        tokio::fs::write(&output, to_srt(&cues)).await?;
        info!(path = %output.display(), "subtitle file written");
        Ok(Some(output))
    }

    async fn fetch_segment(&self, url: &str) -> Result<String, GrabError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VTT: &str = "WEBVTT\n\
                       X-TIMESTAMP-MAP=MPEGTS:900000,LOCAL:00:00:00.000\n\
                       \n\
                       NOTE this block is skipped\n\
                       ignored note text\n\
                       \n\
                       1\n\
                       00:01:02.500 --> 00:01:04.000 align:middle\n\
                       Bonjour.\n\
                       \n\
                       02:10.000 --> 02:12.250\n\
                       Deux lignes\n\
                       de texte.\n";

    #[test]
    fn parses_cues_with_and_without_hours() {
        let cues = parse_webvtt(VTT);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, Duration::from_millis(62_500));
        assert_eq!(cues[0].end, Duration::from_millis(64_000));
        assert_eq!(cues[0].text, "Bonjour.");
        assert_eq!(cues[1].start, Duration::from_millis(130_000));
        assert_eq!(cues[1].text, "Deux lignes\nde texte.");
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let cues = parse_webvtt("WEBVTT\n\njunk line\n\n00:00:01.000 --> bogus\ntext\n");
        assert!(cues.is_empty());
    }

    #[test]
    fn realign_shifts_to_time_zero() {
        let mut cues = parse_webvtt(VTT);
        realign(&mut cues);
        assert_eq!(cues[0].start, Duration::ZERO);
        assert_eq!(cues[0].end, Duration::from_millis(1_500));
        assert_eq!(cues[1].start, Duration::from_millis(67_500));
    }

    #[test]
    fn realign_handles_empty() {
        let mut cues: Vec<Cue> = Vec::new();
        realign(&mut cues);
        assert!(cues.is_empty());
    }

    #[test]
    fn srt_output_format() {
        let mut cues = parse_webvtt(VTT);
        realign(&mut cues);
        let srt = to_srt(&cues);
        let expected = "1\n00:00:00,000 --> 00:00:01,500\nBonjour.\n\n\
                        2\n00:01:07,500 --> 00:01:09,750\nDeux lignes\nde texte.\n\n";
        assert_eq!(srt, expected);
    }
}
