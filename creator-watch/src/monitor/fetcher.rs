//! Profile page retrieval.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::COOKIE;
use tracing::debug;

use crate::Result;
use crate::notification::messages::PROFILE_BASE_URL;

/// Retrieves the rendered profile page of an account.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the page body. `cookies` is the raw `Cookie` header value and
    /// may be empty.
    async fn fetch(&self, account: &str, cookies: &str) -> Result<String>;
}

/// [`PageFetcher`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    base_url: String,
}

impl HttpPageFetcher {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, PROFILE_BASE_URL)
    }

    /// `base_url` is prefixed verbatim to the account name.
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn url_for(&self, account: &str) -> String {
        format!("{}{}", self.base_url, account)
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, account: &str, cookies: &str) -> Result<String> {
        let mut request = self.client.get(self.url_for(account));
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            // Error pages are still classified from their content.
            debug!(account, %status, "Profile page returned non-success status");
        }
        Ok(response.text().await?)
    }
}
