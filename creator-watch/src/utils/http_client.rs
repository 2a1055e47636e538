use std::{sync::OnceLock, time::Duration};

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tracing::debug;

use crate::Result;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client used to fetch profile pages.
///
/// Looks like a desktop browser. `Accept-Encoding` is left to reqwest so
/// decompression stays automatic.
pub fn build_page_client(request_timeout: Option<Duration>) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    let mut builder = reqwest::Client::builder()
        .user_agent(DEFAULT_UA)
        .default_headers(headers);
    if let Some(timeout) = request_timeout.filter(|t| !t.is_zero()) {
        builder = builder.timeout(timeout);
    }

    Ok(builder.build()?)
}

/// Build the client used for outbound API calls (chat delivery).
pub fn build_api_client(request_timeout: Option<Duration>) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(concat!(
        "creator-watch/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = request_timeout.filter(|t| !t.is_zero()) {
        builder = builder.timeout(timeout);
    }

    Ok(builder.build()?)
}
