//! URI resolution for playlist entries.

use url::Url;

/// Resolves a playlist URI against the playlist's own URL.
///
/// Absolute (`http`-prefixed) URIs pass through untouched. Relative URIs are
/// appended to the base after stripping the base's query string and
/// truncating it at the last `/`; a leading `./` on the URI is dropped. URIs
/// starting with `/` resolve against the base's scheme and authority.
pub fn resolve_uri(uri: &str, base: &str) -> String {
    let uri = uri.trim();
    if uri.starts_with("http") {
        return uri.to_string();
    }

    if let Some(rest) = uri.strip_prefix('/') {
        if let Ok(parsed) = Url::parse(base) {
            if let Some(host) = parsed.host_str() {
                let mut origin = format!("{}://{}", parsed.scheme(), host);
                if let Some(port) = parsed.port() {
                    origin.push_str(&format!(":{port}"));
                }
                return format!("{origin}/{rest}");
            }
        }
    }

    let base = match base.split_once('?') {
        Some((before, _)) => before,
        None => base,
    };
    let dir = match base.rfind('/') {
        Some(idx) => &base[..=idx],
        None => base,
    };
    let uri = uri.strip_prefix("./").unwrap_or(uri);
    format!("{dir}{uri}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_uris_pass_through() {
        assert_eq!(
            resolve_uri("https://x/y", "https://h/p/b.m3u8"),
            "https://x/y"
        );
        assert_eq!(resolve_uri("http://x/y", "ignored"), "http://x/y");
    }

    #[test]
    fn relative_uri_resolves_against_base_dir() {
        assert_eq!(
            resolve_uri("./a", "https://h/p/b.m3u8"),
            "https://h/p/a"
        );
        assert_eq!(
            resolve_uri("seg0.ts", "https://h/p/b.m3u8"),
            "https://h/p/seg0.ts"
        );
    }

    #[test]
    fn base_query_is_stripped() {
        assert_eq!(
            resolve_uri("seg0.ts", "https://h/p/b.m3u8?token=abc/def"),
            "https://h/p/seg0.ts"
        );
    }

    #[test]
    fn root_relative_uri_uses_authority() {
        assert_eq!(
            resolve_uri("/keys/k.bin", "https://h:8443/p/q/b.m3u8"),
            "https://h:8443/keys/k.bin"
        );
    }
}
