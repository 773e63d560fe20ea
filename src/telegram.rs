//! Minimal Bot API client
//!
//! Covers what the chat bot and the delivery channels need: long polling,
//! messages with inline keyboards, and document uploads with byte-level
//! progress. The same client talks to the public endpoint and to a
//! self-hosted server that accepts large payloads.

use crate::delivery::ProgressSink;
use crate::error::{Error, Result};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Slack on top of the long-poll timeout before the HTTP request gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Chat member or bot account
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Chat a message belongs to
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// A sent or received message
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Button press on an inline keyboard
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// One entry from `getUpdates`
#[derive(Clone, Debug, Deserialize, Serialize)]
#[allow(missing_docs)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Inline keyboard button, either a callback or a URL
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineKeyboardButton {
    /// Label
    pub text: String,
    /// Data echoed back in the callback query (max 64 bytes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    /// URL opened by the button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineKeyboardButton {
    /// Button that sends `data` back to the bot
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    /// Button that opens `url`
    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

/// Inline keyboard attached to a message
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InlineKeyboardMarkup {
    /// Rows of buttons
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// One button per row
    pub fn column(buttons: Vec<InlineKeyboardButton>) -> Self {
        Self {
            inline_keyboard: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
    disable_web_page_preview: bool,
}

/// Bot API client bound to one endpoint and token
#[derive(Clone)]
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for BotApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BotApiClient {
    /// Client for `base_url` (e.g. `https://api.telegram.org`)
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Endpoint this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn decode<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| e.without_url())?;
        let envelope: Envelope<T> = serde_json::from_slice(&body).map_err(|e| {
            Error::ChannelRejected(format!("{method}: unreadable response ({status}): {e}"))
        })?;

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            Envelope {
                description,
                error_code,
                ..
            } => Err(Error::ChannelRejected(format!(
                "{method} failed ({}): {}",
                error_code.unwrap_or(i64::from(status.as_u16())),
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut request = self.http.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| e.without_url())?;
        Self::decode(method, response).await
    }

    /// Identity of the bot; doubles as a connectivity check
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({}), Some(Duration::from_secs(10)))
            .await
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body, Some(timeout + POLL_GRACE))
            .await
    }

    /// Send a text message
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        let body = SendMessage {
            chat_id,
            text,
            reply_markup: markup,
            disable_web_page_preview: true,
        };
        self.call("sendMessage", &body, Some(Duration::from_secs(30)))
            .await
    }

    /// Replace the text (and keyboard) of a message
    ///
    /// "message is not modified" is treated as success.
    pub async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let body = EditMessageText {
            chat_id,
            message_id,
            text,
            reply_markup: markup,
            disable_web_page_preview: true,
        };
        match self
            .call::<_, serde_json::Value>("editMessageText", &body, Some(Duration::from_secs(30)))
            .await
        {
            Ok(_) => Ok(()),
            Err(Error::ChannelRejected(msg)) if msg.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Acknowledge a button press
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let body = serde_json::json!({ "callback_query_id": callback_query_id });
        self.call::<_, bool>("answerCallbackQuery", &body, Some(Duration::from_secs(10)))
            .await
            .map(|_| ())
    }

    /// Upload `path` as a document, streaming it from disk
    ///
    /// Every chunk handed to the HTTP body is reported to `progress`.
    pub async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        file_name: &str,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<Message> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::ArtifactMissing {
                    path: path.to_path_buf(),
                },
                _ => Error::Io(e),
            })?;
        let total = file.metadata().await?.len();
        let sent = Arc::new(AtomicU64::new(0));
        progress.report(0, total);

        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                let now = sent.fetch_add(bytes.len() as u64, Ordering::Relaxed) + bytes.len() as u64;
                progress.report(now, total);
            }
        });

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(stream),
            total,
        )
        .file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        Self::decode("sendDocument", response).await
    }
}
