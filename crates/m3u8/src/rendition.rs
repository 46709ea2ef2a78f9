//! `#EXT-X-STREAM-INF` variant-stream entries.

use std::fmt;

use crate::attr::{decode_attribute_list, split_and_trim_comma_list};

pub const STREAM_INF_MARKER: &str = "#EXT-X-STREAM-INF";

/// A Rendition is an alternative version of a stream.
///
/// Each member of the group must be an alternative rendition of the same
/// content, differing in bandwidth, resolution or codecs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendition {
    pub program_id: u32,

    /// Peak segment bit rate of the variant stream, in bits per second.
    pub bandwidth: u64,

    /// Optimal pixel resolution at which to display the video, e.g.
    /// `1280x720`.
    pub resolution: String,

    /// Formats from the quoted `CODECS` attribute, comma split and trimmed.
    pub codecs: Vec<String>,

    /// Closed-caption group ids. `CLOSED-CAPTIONS=NONE` yields an empty
    /// list, not a single `NONE` entry.
    pub closed_captions: Vec<String>,

    /// Group id of the audio renditions to use with this variant.
    pub audio_group: String,

    /// Group id of the video renditions to use with this variant.
    pub video_group: String,

    /// Maximum frame rate of the video, rounded to three decimals.
    pub frame_rate: f64,

    /// Media playlist URI. Usually supplied by the line following the tag;
    /// an inline `URI` attribute is honored as a fallback.
    pub url: String,
}

impl Rendition {
    /// Extracts a rendition from a `#EXT-X-STREAM-INF` line. Returns `None`
    /// for any other line.
    pub fn from_line(line: &str) -> Option<Rendition> {
        let rest = line.strip_prefix(STREAM_INF_MARKER)?;
        let rest = rest.strip_prefix(':').unwrap_or(rest);

        let mut rendition = Rendition::default();
        for (key, value) in decode_attribute_list(rest) {
            match key.as_str() {
                "PROGRAM-ID" => rendition.program_id = value.parse().unwrap_or(0),
                "BANDWIDTH" => rendition.bandwidth = value.parse().unwrap_or(0),
                "RESOLUTION" => rendition.resolution = value,
                "CODECS" => rendition.codecs = split_and_trim_comma_list(&value),
                "FRAME-RATE" => rendition.frame_rate = value.parse().unwrap_or(0.0),
                "CLOSED-CAPTIONS" => {
                    if value != "NONE" {
                        rendition.closed_captions = split_and_trim_comma_list(&value);
                    }
                }
                "AUDIO" => rendition.audio_group = value,
                "VIDEO" => rendition.video_group = value,
                "URI" => rendition.url = value,
                _ => {}
            }
        }
        Some(rendition)
    }
}

impl fmt::Display for Rendition {
    /// Serializes back to a `#EXT-X-STREAM-INF` line covering the attributes
    /// this parser recognizes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{STREAM_INF_MARKER}:PROGRAM-ID={},BANDWIDTH={}",
            self.program_id, self.bandwidth
        )?;
        if !self.resolution.is_empty() {
            write!(f, ",RESOLUTION={}", self.resolution)?;
        }
        if !self.codecs.is_empty() {
            write!(f, ",CODECS=\"{}\"", self.codecs.join(","))?;
        }
        if self.frame_rate != 0.0 {
            write!(f, ",FRAME-RATE={}", self.frame_rate)?;
        }
        if !self.closed_captions.is_empty() {
            write!(f, ",CLOSED-CAPTIONS=\"{}\"", self.closed_captions.join(","))?;
        }
        if !self.audio_group.is_empty() {
            write!(f, ",AUDIO=\"{}\"", self.audio_group)?;
        }
        if !self.video_group.is_empty() {
            write!(f, ",VIDEO=\"{}\"", self.video_group)?;
        }
        Ok(())
    }
}
