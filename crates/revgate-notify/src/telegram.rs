//! Thin Telegram Bot API client.
//!
//! Only two endpoints are needed (`sendMessage` and `sendPhoto`), so
//! this goes straight through reqwest rather than pulling in a full
//! bot framework. When a proxy is configured, connectivity is probed
//! with `getMe` first and the client silently falls back to a direct
//! connection if the proxy is dead.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use revgate_core::config::TelegramSettings;
use revgate_core::{Error, Result};

const API_ROOT: &str = "https://api.telegram.org";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);
const PHOTO_TIMEOUT: Duration = Duration::from_secs(60);

/// The Bot API response envelope, reduced to the fields we check.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    chat_id: String,
}

impl TelegramClient {
    /// Builds a client from settings. Requires a bot token and chat
    /// id; the proxy is optional and verified before use.
    pub async fn connect(settings: &TelegramSettings) -> Result<Self> {
        let token = settings
            .bot_token
            .clone()
            .ok_or_else(|| Error::Config("telegram.bot_token is not configured".to_string()))?;
        let chat_id = settings
            .chat_id
            .clone()
            .ok_or_else(|| Error::Config("telegram.chat_id is not configured".to_string()))?;
        let api_base = format!("{}/bot{}", API_ROOT, token);

        if let Some(proxy_url) = &settings.proxy {
            let client = Self {
                http: proxied_client(proxy_url)?,
                api_base: api_base.clone(),
                chat_id: chat_id.clone(),
            };
            if client.probe().await {
                info!("telegram reachable through proxy {}", proxy_url);
                return Ok(client);
            }
            warn!(
                "proxy {} unreachable, falling back to a direct connection",
                proxy_url
            );
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_base,
            chat_id,
        })
    }

    /// `getMe` connectivity check. Failures are reported, not raised.
    async fn probe(&self) -> bool {
        let url = format!("{}/getMe", self.api_base);
        match self.http.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("getMe probe failed: {}", e);
                false
            }
        }
    }

    /// Sends a Markdown-formatted message to the configured chat.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.api_base);
        let response = self
            .http
            .post(&url)
            .timeout(MESSAGE_TIMEOUT)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "Markdown"),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("sendMessage failed: {}", e)))?;
        check(response, "sendMessage").await
    }

    /// Uploads a photo with a Markdown caption.
    pub async fn send_photo(&self, photo: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(photo).await?;
        let file_name = photo
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.png".to_string());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown")
            .part(
                "photo",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let url = format!("{}/sendPhoto", self.api_base);
        let response = self
            .http
            .post(&url)
            .timeout(PHOTO_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("sendPhoto failed: {}", e)))?;
        check(response, "sendPhoto").await
    }
}

fn proxied_client(proxy_url: &str) -> Result<reqwest::Client> {
    let proxy = reqwest::Proxy::all(proxy_url)
        .map_err(|e| Error::Config(format!("invalid telegram proxy {}: {}", proxy_url, e)))?;
    reqwest::Client::builder()
        .proxy(proxy)
        .build()
        .map_err(|e| Error::Http(format!("could not build proxied client: {}", e)))
}

async fn check(response: reqwest::Response, method: &str) -> Result<()> {
    let status = response.status();
    let envelope: ApiEnvelope = response
        .json()
        .await
        .map_err(|e| Error::Api(format!("{} returned an unreadable body: {}", method, e)))?;
    if status.is_success() && envelope.ok {
        debug!("{} delivered", method);
        Ok(())
    } else {
        Err(Error::Api(format!(
            "{} rejected ({}): {}",
            method,
            status,
            envelope
                .description
                .unwrap_or_else(|| "no description".to_string())
        )))
    }
}
