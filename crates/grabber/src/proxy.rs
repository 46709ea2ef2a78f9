use reqwest::Proxy;

/// Proxy flavors the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    /// HTTP proxy, configured from a full URL.
    Http,
    /// SOCKS5 proxy, configured from `host:port`.
    Socks5,
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy address: a URL for HTTP, `host:port` for SOCKS5.
    pub url: String,
    pub proxy_type: ProxyType,
}

/// Build a reqwest Proxy object from our proxy configuration.
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, String> {
    match config.proxy_type {
        ProxyType::Http => {
            Proxy::all(&config.url).map_err(|e| format!("Invalid HTTP proxy URL: {e}"))
        }
        ProxyType::Socks5 => {
            let url = if config.url.starts_with("socks5://") {
                config.url.clone()
            } else {
                format!("socks5://{}", config.url)
            };
            Proxy::all(&url).map_err(|e| format!("Invalid SOCKS5 proxy URL: {e}"))
        }
    }
}
