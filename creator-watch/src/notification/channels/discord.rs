//! Discord bot delivery.
//!
//! Implements Discord's recommended rate limit handling:
//! - No hardcoded rate limits
//! - Retries on 429 responses respecting the Retry-After header

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationSink;
use crate::{Error, Result};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Discord rejects message content longer than this many characters.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    id: String,
}

/// Authenticated Discord REST client.
#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    token: String,
    api_base: String,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(client: Client, token: impl Into<String>) -> Self {
        Self::with_api_base(client, token, DISCORD_API_BASE)
    }

    pub fn with_api_base(client: Client, token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Post a text message to a channel.
    pub async fn create_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let payload = json!({ "content": truncate_content(content) });
        self.post(&format!("/channels/{channel_id}/messages"), &payload)
            .await
            .map(|_| ())
    }

    /// Open (or reuse) the direct-message channel with a user.
    async fn open_dm(&self, recipient_id: &str) -> Result<String> {
        let payload = json!({ "recipient_id": recipient_id });
        let body = self.post("/users/@me/channels", &payload).await?;
        let channel: ChannelResponse = serde_json::from_str(&body)?;
        Ok(channel.id)
    }

    /// Send request with rate limit handling.
    /// Retries on 429 responses respecting the Retry-After header.
    async fn post(&self, path: &str, payload: &serde_json::Value) -> Result<String> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::delivery(format!("Discord request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                return Ok(response.text().await.unwrap_or_default());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(format!(
                        "Discord rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} retries"
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            warn!("Discord request to {} failed: {} - {}", path, status, body);
            return Err(Error::delivery(format!(
                "Discord request failed: {status} - {body}"
            )));
        }
    }
}

/// Parse the Retry-After duration from a 429 response.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    for header in ["Retry-After", "X-RateLimit-Reset-After"] {
        if let Some(value) = response.headers().get(header)
            && let Some(secs) = value.to_str().ok().and_then(|v| v.parse::<f64>().ok())
            && secs.is_finite()
            && secs >= 0.0
        {
            return Some(Duration::from_secs_f64(secs));
        }
    }
    None
}

fn truncate_content(content: &str) -> &str {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Delivers subscriber messages as Discord direct messages.
#[derive(Debug)]
pub struct DiscordDirectMessages {
    client: DiscordClient,
    dm_channels: Mutex<HashMap<String, String>>,
}

impl DiscordDirectMessages {
    pub fn new(client: DiscordClient) -> Self {
        Self {
            client,
            dm_channels: Mutex::new(HashMap::new()),
        }
    }

    async fn channel_for(&self, subscriber: &str) -> Result<String> {
        let cached = self.dm_channels.lock().get(subscriber).cloned();
        if let Some(id) = cached {
            return Ok(id);
        }
        let id = self.client.open_dm(subscriber).await?;
        self.dm_channels
            .lock()
            .insert(subscriber.to_string(), id.clone());
        Ok(id)
    }
}

#[async_trait]
impl NotificationSink for DiscordDirectMessages {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, subscriber: &str, message: &str) -> Result<()> {
        let channel_id = self.channel_for(subscriber).await?;
        self.client.create_message(&channel_id, message).await?;
        debug!(subscriber, "Discord DM sent");
        Ok(())
    }
}

/// The operator log channel.
#[derive(Debug, Clone)]
pub struct DiscordLogChannel {
    client: DiscordClient,
    channel_id: String,
}

impl DiscordLogChannel {
    pub fn new(client: DiscordClient, channel_id: impl Into<String>) -> Self {
        Self {
            client,
            channel_id: channel_id.into(),
        }
    }

    pub async fn post(&self, message: &str) -> Result<()> {
        self.client.create_message(&self.channel_id, message).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::utils::http_client::build_api_client;

    fn client_for(server: &MockServer) -> DiscordClient {
        let client = build_api_client(None).expect("api client");
        DiscordClient::with_api_base(client, "token", server.uri())
    }

    #[test]
    fn test_truncate_content() {
        let long = "é".repeat(MAX_CONTENT_CHARS + 10);
        assert_eq!(truncate_content(&long).chars().count(), MAX_CONTENT_CHARS);
        assert_eq!(truncate_content("short"), "short");
    }

    #[tokio::test]
    async fn test_direct_message_opens_channel_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .and(header("authorization", "Bot token"))
            .and(body_json(json!({ "recipient_id": "42" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "900" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/900/messages"))
            .and(body_json(json!({ "content": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
            .expect(2)
            .mount(&server)
            .await;

        let sink = DiscordDirectMessages::new(client_for(&server));
        sink.send("42", "hello").await.unwrap();
        sink.send("42", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/7/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/7/messages"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let channel = DiscordLogChannel::new(client_for(&server), "7");
        channel.post("report").await.unwrap();
    }

    #[tokio::test]
    async fn test_client_error_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Missing Access"))
            .mount(&server)
            .await;

        let sink = DiscordDirectMessages::new(client_for(&server));
        let result = sink.send("42", "hello").await;
        assert!(matches!(result, Err(Error::Delivery(_))));
    }
}
