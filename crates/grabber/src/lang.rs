//! Track-language derivation for muxer metadata.

/// Maps an ISO 639-1 code to its ISO 639-2/B equivalent, the form the muxer
/// expects in `language=` metadata. Three-letter codes pass through; anything
/// unrecognized becomes `und`.
pub fn iso639_2(code: &str) -> &str {
    let code = code.trim();
    match code.to_lowercase().as_str() {
        "ar" => "ara",
        "cs" => "cze",
        "da" => "dan",
        "de" => "ger",
        "el" => "gre",
        "en" => "eng",
        "es" => "spa",
        "fi" => "fin",
        "fr" => "fre",
        "he" => "heb",
        "hi" => "hin",
        "hu" => "hun",
        "id" => "ind",
        "it" => "ita",
        "ja" => "jpn",
        "ko" => "kor",
        "nl" => "dut",
        "no" => "nor",
        "pl" => "pol",
        "pt" => "por",
        "ro" => "rum",
        "ru" => "rus",
        "sv" => "swe",
        "th" => "tha",
        "tr" => "tur",
        "uk" => "ukr",
        "vi" => "vie",
        "zh" => "chi",
        other if other.len() == 3 && other.chars().all(|c| c.is_ascii_lowercase()) => {
            // already a 639-2 code; keep the caller's string
            &code[..]
        }
        _ => "und",
    }
}

/// Parses the `_audio_<name>_<lang>` suffix an audio artifact carries,
/// returning the track title and language.
pub fn audio_track_meta(filename: &str) -> Option<(&str, &str)> {
    let (_, rest) = filename.rsplit_once("_audio_")?;
    let (name, lang) = rest.rsplit_once('_')?;
    if name.is_empty() {
        return None;
    }
    Some((name, lang))
}

/// Parses the `_<lang>.srt` suffix of a subtitle artifact.
pub fn subtitle_lang(filename: &str) -> Option<&str> {
    let stem = filename.strip_suffix(".srt")?;
    let (_, lang) = stem.rsplit_once('_')?;
    if lang.is_empty() { None } else { Some(lang) }
}
