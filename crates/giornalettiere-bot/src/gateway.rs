//! Messaging gateway: delivers documents to chats.
//!
//! `TelegramGateway` talks to the Telegram Bot API `sendDocument` method.
//! Files up to [`LARGE_UPLOAD_THRESHOLD`] are read into memory and sent on
//! the small path. Larger files are streamed from disk on the large path,
//! bounded by a timeout and cancelled by [`TelegramGateway::shutdown`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Size above which uploads take the streaming path (50 MB).
pub const LARGE_UPLOAD_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Request timeout for small uploads.
const SMALL_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The bot was blocked by, or removed from, the chat.
    #[error("chat {chat} refused the bot: {description}")]
    Unauthorized { chat: String, description: String },

    #[error("bad request for chat {chat}: {description}")]
    BadRequest { chat: String, description: String },

    /// Any other non-success answer from the API.
    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can deliver a document to a chat.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_document(&self, chat: &str, path: &Path, caption: &str)
        -> Result<(), GatewayError>;
}

#[derive(Debug, Default, Deserialize)]
struct ApiReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Telegram Bot API client.
pub struct TelegramGateway {
    client: reqwest::Client,
    api_url: String,
    token: String,
    large_threshold: u64,
    large_timeout: Duration,
    cancel: CancellationToken,
}

impl TelegramGateway {
    pub fn new(api_url: &str, token: &str, large_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            large_threshold: LARGE_UPLOAD_THRESHOLD,
            large_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the size above which uploads are streamed.
    pub fn with_large_threshold(mut self, bytes: u64) -> Self {
        self.large_threshold = bytes;
        self
    }

    /// Cancel in-flight and future large uploads.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }

    /// Username of the bot, as reported by `getMe`.
    pub async fn get_me(&self) -> Result<String, GatewayError> {
        let response = self.client.get(self.method_url("getMe")).send().await?;
        let reply = read_reply("", response).await?;
        Ok(reply
            .result
            .as_ref()
            .and_then(|r| r.get("username"))
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn send_small(
        &self,
        chat: &str,
        path: &Path,
        file_name: String,
        caption: &str,
    ) -> Result<(), GatewayError> {
        let bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(bytes).file_name(file_name);
        let form = document_form(chat, caption, part);

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .timeout(SMALL_UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| timeout_or_transport(e, SMALL_UPLOAD_TIMEOUT))?;
        read_reply(chat, response).await.map(|_| ())
    }

    async fn send_large(
        &self,
        chat: &str,
        path: &Path,
        file_name: String,
        size: u64,
        caption: &str,
    ) -> Result<(), GatewayError> {
        if self.cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        let file = tokio::fs::File::open(path).await?;
        let part = Part::stream_with_length(reqwest::Body::from(file), size).file_name(file_name);
        let form = document_form(chat, caption, part);

        let request = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .timeout(self.large_timeout)
            .send();

        tokio::select! {
            _ = self.cancel.cancelled() => Err(GatewayError::Cancelled),
            response = request => {
                let response = response.map_err(|e| timeout_or_transport(e, self.large_timeout))?;
                read_reply(chat, response).await.map(|_| ())
            }
        }
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_document(
        &self,
        chat: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), GatewayError> {
        let size = tokio::fs::metadata(path).await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        if size > self.large_threshold {
            info!("streaming large upload {file_name} ({size} bytes) to {chat}");
            self.send_large(chat, path, file_name, size, caption).await
        } else {
            debug!("uploading {file_name} ({size} bytes) to {chat}");
            self.send_small(chat, path, file_name, caption).await
        }
    }
}

fn document_form(chat: &str, caption: &str, document: Part) -> Form {
    let mut form = Form::new().text("chat_id", chat.to_string());
    if !caption.is_empty() {
        form = form.text("caption", caption.to_string());
    }
    form.part("document", document)
}

fn timeout_or_transport(e: reqwest::Error, limit: Duration) -> GatewayError {
    if e.is_timeout() {
        GatewayError::TimedOut(limit)
    } else {
        GatewayError::Transport(e)
    }
}

/// Map an API answer to success or a typed error.
async fn read_reply(chat: &str, response: reqwest::Response) -> Result<ApiReply, GatewayError> {
    let status = response.status().as_u16();
    let reply: ApiReply = response.json().await.unwrap_or_default();
    let description = reply
        .description
        .clone()
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        401 | 403 => Err(GatewayError::Unauthorized {
            chat: chat.to_string(),
            description,
        }),
        400 => Err(GatewayError::BadRequest {
            chat: chat.to_string(),
            description,
        }),
        200..=299 if reply.ok => Ok(reply),
        200..=299 => Err(GatewayError::BadRequest {
            chat: chat.to_string(),
            description,
        }),
        _ => Err(GatewayError::Api {
            status,
            description,
        }),
    }
}
