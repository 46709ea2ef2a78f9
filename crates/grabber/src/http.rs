use std::sync::Arc;

use reqwest::Client;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::{debug, info};

use crate::config::GrabberConfig;
use crate::error::GrabError;
use crate::proxy::build_proxy_from_config;

/// Create the shared reqwest Client.
///
/// The cookie store is enabled so origin-scoped cookies set by the playlist
/// response propagate to key and segment fetches.
pub fn create_client(config: &GrabberConfig) -> Result<Client, GrabError> {
    let provider = Arc::new(ring::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .expect("Failed to configure platform certificate verifier")
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .cookie_store(true)
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::limited(10));

    if !config.request_timeout.is_zero() {
        client_builder = client_builder.timeout(config.request_timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        let proxy = build_proxy_from_config(proxy_config).map_err(GrabError::Config)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, "Using configured proxy for downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for downloads");
    }

    client_builder.build().map_err(GrabError::from)
}
