//! `#EXT-X-KEY` encryption metadata.

use crate::M3u8Error;
use crate::attr::decode_attribute_list;

pub const KEY_MARKER: &str = "#EXT-X-KEY:";

/// Encryption method declared by a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CryptoMethod {
    /// No encryption.
    #[default]
    None,
    /// AES-128 CBC encryption of whole segments.
    Aes128,
    /// Sample-based AES encryption (FairPlay territory).
    SampleAes,
    /// Any other method, kept as its lowercased raw string.
    Other(String),
}

impl CryptoMethod {
    /// Methods are compared case-insensitively.
    pub fn from_str_normalized(raw: &str) -> CryptoMethod {
        match raw.to_lowercase().as_str() {
            "" | "none" => CryptoMethod::None,
            "aes-128" => CryptoMethod::Aes128,
            "sample-aes" => CryptoMethod::SampleAes,
            other => CryptoMethod::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CryptoMethod::None => "none",
            CryptoMethod::Aes128 => "aes-128",
            CryptoMethod::SampleAes => "sample-aes",
            CryptoMethod::Other(s) => s,
        }
    }
}

/// A parsed `#EXT-X-KEY` tag. The raw line is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTag {
    pub method: CryptoMethod,
    pub uri: Option<String>,
    pub iv: Option<[u8; 16]>,
    pub raw_line: String,
}

impl KeyTag {
    /// Parses a `#EXT-X-KEY:` line. Returns `None` for any other line.
    pub fn from_line(line: &str) -> Option<Result<KeyTag, M3u8Error>> {
        let rest = line.strip_prefix(KEY_MARKER)?;

        let mut method = CryptoMethod::None;
        let mut uri = None;
        let mut iv = None;
        for (key, value) in decode_attribute_list(rest) {
            match key.as_str() {
                "METHOD" => method = CryptoMethod::from_str_normalized(&value),
                "URI" => uri = Some(value),
                "IV" => match parse_iv(&value) {
                    Ok(parsed) => iv = Some(parsed),
                    Err(e) => return Some(Err(e)),
                },
                _ => {}
            }
        }

        Some(Ok(KeyTag {
            method,
            uri,
            iv,
            raw_line: line.to_string(),
        }))
    }
}

/// Decodes a hex IV attribute (`0x…` prefix optional) into 16 bytes.
pub fn parse_iv(raw: &str) -> Result<[u8; 16], M3u8Error> {
    let hex_str = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let mut iv = [0u8; 16];
    hex::decode_to_slice(hex_str, &mut iv).map_err(|e| M3u8Error::InvalidAttribute {
        name: "IV".to_string(),
        reason: e.to_string(),
    })?;
    Ok(iv)
}
