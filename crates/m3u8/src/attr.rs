//! Attribute-list decoding for M3U8 tags.
//!
//! Tags like `#EXT-X-STREAM-INF` and `#EXT-X-MEDIA` carry a comma separated
//! `KEY=VALUE` list where values may be quoted strings containing commas.

/// Decodes a `KEY=VALUE[,KEY=VALUE…]` attribute list, honoring quoted
/// strings. Values are returned unquoted, in declaration order.
pub fn decode_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        // key: everything up to '='
        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim();
        if key.is_empty() {
            break;
        }

        // value: quoted or bare, up to the next unquoted ','
        let mut value = String::new();
        match chars.peek() {
            Some('"') => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    value.push(c);
                }
                // swallow the separator after the closing quote
                for c in chars.by_ref() {
                    if c == ',' {
                        break;
                    }
                }
            }
            _ => {
                for c in chars.by_ref() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                }
            }
        }

        pairs.push((key.to_string(), value.trim().to_string()));

        if chars.peek().is_none() {
            break;
        }
    }

    pairs
}

/// Looks up a single attribute by key.
pub fn attribute<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Splits a comma separated list, trimming each entry and dropping empties.
pub fn split_and_trim_comma_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
