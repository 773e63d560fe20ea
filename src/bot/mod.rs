//! Chat bot front end
//!
//! Long-polls the Bot API and turns messages into relay calls: a URL (or
//! `/download <url>`) lists the selectable formats as buttons, a chosen
//! format starts a retrieval whose progress edits one status message, and
//! the finished file is offered through whichever delivery options the
//! strategy selector allows.

pub mod format;

use crate::delivery::{
    DeliveryOption, DeliveryOutcome, DeliveryTarget, ProgressTracker, StrategyDecision,
    UploadNotifier, UploadSnapshot,
};
use crate::error::{Error, Result};
use crate::extractor::with_best_audio;
use crate::service::MediaRelay;
use crate::telegram::{
    BotApiClient, CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update,
};
use crate::types::{Event, JobId, JobSnapshot, JobStatus};
use async_trait::async_trait;
use format::{
    download_progress_text, format_button_text, format_callback, format_duration, format_size,
    upload_progress_text,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// At most this many format buttons are offered
pub const MAX_FORMAT_BUTTONS: usize = 20;

/// Selector used when the user picks "best" or no format at all
const BEST_SELECTOR: &str = "bestvideo+bestaudio/best";

/// Pending format selections older than this are forgotten
const PENDING_TTL: Duration = Duration::from_secs(60 * 60);

/// Back-off after a failed `getUpdates`
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on how long the job watcher sleeps between store checks
const WATCH_TICK: Duration = Duration::from_secs(1);

const WELCOME_TEXT: &str = "🎬 Welcome to the Media Relay Bot!\n\n\
📋 Available commands:\n\
/start - Show this help message\n\
/download <url> - Download a video\n\
/info <url> - Get video information\n\
/cancel - Cancel current download\n\n\
💡 You can also just send me a URL directly!\n\n\
📥 After download, choose:\n\
• Send file via Telegram\n\
• Get download link (for any file size)";

const HELP_TEXT: &str = "📖 How to use:\n\n\
1️⃣ Send a video URL\n\
2️⃣ Select quality/format\n\
3️⃣ Choose download method:\n   \
📤 Send via Telegram\n   \
🔗 Get download link (for any file size)\n\n\
Commands:\n\
/start - Start the bot\n\
/download <url> - Download video\n\
/info <url> - Get video info\n\
/cancel - Cancel download\n\n\
💡 Tip: Files too large for Telegram always get a download link";

/// A parsed slash command
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Start,
    Help,
    Cancel,
    Download(Option<&'a str>),
    Info(Option<&'a str>),
    Unknown,
}

impl<'a> Command<'a> {
    /// Parse `/name[@bot] [arg]`; `None` for plain text
    fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, arg) = match rest.split_once(char::is_whitespace) {
            Some((head, arg)) => (head, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let name = head.split('@').next().unwrap_or(head);
        Some(match name {
            "start" => Command::Start,
            "help" => Command::Help,
            "cancel" => Command::Cancel,
            "download" => Command::Download(arg),
            "info" => Command::Info(arg),
            _ => Command::Unknown,
        })
    }
}

/// A button press, decoded from its callback data
#[derive(Debug, PartialEq, Eq)]
enum Callback<'a> {
    /// `dl:<pending>:<format>`
    Format { pending: &'a str, format: &'a str },
    /// `send_file:<id>`
    SendFile(&'a str),
    /// `send_large:<id>`
    SendLarge(&'a str),
    /// `send_link:<id>`
    SendLink(&'a str),
}

impl<'a> Callback<'a> {
    fn parse(data: &'a str) -> Option<Self> {
        if let Some(rest) = data.strip_prefix("dl:") {
            let (pending, format) = rest.split_once(':')?;
            return Some(Callback::Format { pending, format });
        }
        let (kind, id) = data.split_once(':')?;
        match kind {
            "send_file" => Some(Callback::SendFile(id)),
            "send_large" => Some(Callback::SendLarge(id)),
            "send_link" => Some(Callback::SendLink(id)),
            _ => None,
        }
    }
}

/// First http(s) URL in `text`
fn find_url(text: &str) -> Option<&str> {
    text.split_whitespace()
        .find(|word| word.starts_with("http://") || word.starts_with("https://"))
}

/// Bot API refuses URL buttons pointing at local addresses
fn is_local_link(url: &str) -> bool {
    ["localhost", "127.0.0.1", "0.0.0.0"]
        .iter()
        .any(|host| url.contains(host))
}

/// Selector for a format picked from the button list
fn selector_for(format: &str) -> String {
    if format == "best" {
        BEST_SELECTOR.to_string()
    } else {
        with_best_audio(format)
    }
}

/// Link message, with a URL button unless the link is local
fn link_message(
    name: &str,
    size: u64,
    url: &str,
    validity_days: u64,
) -> (String, Option<InlineKeyboardMarkup>) {
    let mut text = format!(
        "🔗 Download Link\n\n📹 {name}\n💾 Size: {}\n\nClick the link below to download:\n{url}\n\n⚠️ Link expires in {validity_days} days",
        format_size(size)
    );
    if let Some(expiry) = chrono::Utc::now().checked_add_days(chrono::Days::new(validity_days)) {
        text.push_str(&format!(" ({})", expiry.format("%Y-%m-%d %H:%M UTC")));
    }
    if is_local_link(url) {
        text.push_str("\n\n⚠️ Note: This is a localhost URL. Copy and paste it into your browser.");
        (text, None)
    } else {
        let markup =
            InlineKeyboardMarkup::column(vec![InlineKeyboardButton::link("🔗 Open Download Link", url)]);
        (text, Some(markup))
    }
}

/// Buttons for the options the strategy selector offered
fn delivery_keyboard(id: &JobId, decision: &StrategyDecision) -> InlineKeyboardMarkup {
    let mut buttons = Vec::new();
    if decision.offers(DeliveryOption::Direct) {
        buttons.push(InlineKeyboardButton::callback(
            "📤 Send File via Telegram",
            format!("send_file:{id}"),
        ));
    }
    if decision.offers(DeliveryOption::LargePayload) {
        buttons.push(InlineKeyboardButton::callback(
            "📤 Send File to Channel",
            format!("send_large:{id}"),
        ));
    } else if decision.offers(DeliveryOption::SplitUpload) {
        buttons.push(InlineKeyboardButton::callback(
            "✂️ Send File in Parts",
            format!("send_large:{id}"),
        ));
    }
    let link_label = if decision.is_link_only() {
        "🔗 Get Download Link (File too large for Telegram)"
    } else {
        "🔗 Get Download Link"
    };
    buttons.push(InlineKeyboardButton::callback(
        link_label,
        format!("send_link:{id}"),
    ));
    InlineKeyboardMarkup::column(buttons)
}

fn completion_text(snapshot: &JobSnapshot, decision: &StrategyDecision) -> String {
    let mut text = format!(
        "✅ Download complete!\n\n📹 {}\n💾 Size: {}\n\n",
        snapshot.filename,
        format_size(decision.size)
    );
    if decision.is_link_only() {
        let reason = decision
            .rejection_for(DeliveryOption::Direct)
            .unwrap_or("file cannot be sent through Telegram");
        text.push_str(&format!("⚠️ {reason}\nUse the download link instead:"));
    } else {
        text.push_str("Choose how to receive the file:");
    }
    text
}

/// Format selection waiting for a button press
#[derive(Clone, Debug)]
struct PendingSelection {
    url: String,
    created: Instant,
}

/// Edits a chat status message as upload progress arrives
struct StatusMessageNotifier {
    client: BotApiClient,
    chat_id: String,
    message_id: i64,
    name: String,
}

#[async_trait]
impl UploadNotifier for StatusMessageNotifier {
    async fn notify(&self, snapshot: &UploadSnapshot) {
        let text = upload_progress_text(&self.name, snapshot);
        if let Err(e) = self
            .client
            .edit_message_text(&self.chat_id, self.message_id, &text, None)
            .await
        {
            debug!(chat_id = %self.chat_id, error = %e, "upload status edit failed");
        }
    }
}

/// Long-polling chat bot bound to one relay
pub struct ChatBot {
    client: BotApiClient,
    relay: Arc<MediaRelay>,
    poll_timeout: Duration,
    pending: Mutex<HashMap<String, PendingSelection>>,
    active: Mutex<HashMap<String, JobId>>,
}

impl ChatBot {
    /// Bot talking to `client` on behalf of `relay`
    pub fn new(client: BotApiClient, relay: Arc<MediaRelay>) -> Self {
        let poll_timeout = relay.config().telegram.poll_timeout;
        Self {
            client,
            relay,
            poll_timeout,
            pending: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Bot from the relay's chat settings; `None` without a token or when disabled
    pub fn from_relay(relay: Arc<MediaRelay>) -> Option<Self> {
        let telegram = &relay.config().telegram;
        if !telegram.bot_enabled {
            return None;
        }
        let token = telegram.bot_token.clone()?;
        let client = BotApiClient::new(telegram.bot_api_url.clone(), token);
        Some(Self::new(client, relay))
    }

    /// Poll for updates until `shutdown` is cancelled
    ///
    /// Each update is handled on its own task so a long upload never holds
    /// up the next message.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let me = self.client.get_me().await?;
        info!(
            username = me.username.as_deref().unwrap_or(""),
            "chat bot polling for updates"
        );

        let mut offset = 0;
        loop {
            let updates = tokio::select! {
                _ = shutdown.cancelled() => break,
                updates = self.client.get_updates(offset, self.poll_timeout) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let bot = self.clone();
                        tokio::spawn(async move { bot.handle_update(update).await });
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("chat bot stopped");
        Ok(())
    }

    /// Handle one update to completion
    pub async fn handle_update(&self, update: Update) {
        let result = if let Some(query) = update.callback_query {
            self.on_callback(query).await
        } else if let Some(message) = update.message {
            self.on_message(message).await
        } else {
            Ok(())
        };
        if let Err(e) = result {
            warn!(update_id = update.update_id, error = %e, "failed to handle update");
        }
    }

    async fn reply(&self, chat_id: &str, text: &str) -> Result<Message> {
        self.client.send_message(chat_id, text, None).await
    }

    async fn on_message(&self, message: Message) -> Result<()> {
        let chat_id = message.chat.id.to_string();
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };

        match Command::parse(text) {
            Some(Command::Start) => self.reply(&chat_id, WELCOME_TEXT).await.map(drop),
            Some(Command::Help) => self.reply(&chat_id, HELP_TEXT).await.map(drop),
            Some(Command::Cancel) => self.cancel_active(&chat_id).await,
            Some(Command::Download(Some(url))) => self.offer_formats(&chat_id, url).await,
            Some(Command::Download(None)) => self
                .reply(
                    &chat_id,
                    "❌ Please provide a video URL.\nUsage: /download <url>",
                )
                .await
                .map(drop),
            Some(Command::Info(Some(url))) => self.send_info(&chat_id, url).await,
            Some(Command::Info(None)) => self
                .reply(&chat_id, "❌ Please provide a video URL.\nUsage: /info <url>")
                .await
                .map(drop),
            Some(Command::Unknown) => self
                .reply(&chat_id, "❌ Unknown command. Use /help for commands.")
                .await
                .map(drop),
            None => match find_url(text) {
                Some(url) => self.offer_formats(&chat_id, url).await,
                None => self
                    .reply(
                        &chat_id,
                        "❌ Please send a valid video URL or use /help for commands.",
                    )
                    .await
                    .map(drop),
            },
        }
    }

    async fn cancel_active(&self, chat_id: &str) -> Result<()> {
        let active = self.active.lock().await.remove(chat_id);
        let cancelled = active.is_some_and(|id| self.relay.cancel(&id));
        let text = if cancelled {
            "✅ Download cancelled"
        } else {
            "❌ No active download to cancel"
        };
        self.reply(chat_id, text).await.map(drop)
    }

    async fn send_info(&self, chat_id: &str, url: &str) -> Result<()> {
        let status = self
            .reply(chat_id, "🔍 Fetching video information...")
            .await?;
        let text = match self.relay.media_info(url).await {
            Ok(info) => format!(
                "📹 {}\n\n⏱ Duration: {}\n📊 Formats available: {}\n\nSend the URL again to download, or use /download <url>",
                info.title,
                format_duration(info.duration),
                info.formats.len()
            ),
            Err(e) => format!("❌ Error: {e}"),
        };
        self.client
            .edit_message_text(chat_id, status.message_id, &text, None)
            .await
    }

    async fn offer_formats(&self, chat_id: &str, url: &str) -> Result<()> {
        let status = self
            .reply(chat_id, "🔍 Fetching video information...")
            .await?;
        let info = match self.relay.media_info(url).await {
            Ok(info) => info,
            Err(e) => {
                return self
                    .client
                    .edit_message_text(chat_id, status.message_id, &format!("❌ Error: {e}"), None)
                    .await;
            }
        };

        let pending_id = self.remember(url).await;
        let mut buttons: Vec<InlineKeyboardButton> = info
            .formats
            .iter()
            .take(MAX_FORMAT_BUTTONS)
            .map(|f| {
                InlineKeyboardButton::callback(
                    format_button_text(f),
                    format_callback(&pending_id, &f.format_id),
                )
            })
            .collect();
        buttons.push(InlineKeyboardButton::callback(
            "⭐ Best available",
            format_callback(&pending_id, "best"),
        ));

        let text = format!(
            "📹 {}\n⏱ Duration: {}\n\nSelect a format:",
            info.title,
            format_duration(info.duration)
        );
        self.client
            .edit_message_text(
                chat_id,
                status.message_id,
                &text,
                Some(&InlineKeyboardMarkup::column(buttons)),
            )
            .await
    }

    /// Store `url` under a short id that fits in callback data
    async fn remember(&self, url: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, p| p.created.elapsed() < PENDING_TTL);
        pending.insert(
            id.clone(),
            PendingSelection {
                url: url.to_string(),
                created: Instant::now(),
            },
        );
        id
    }

    async fn on_callback(&self, query: CallbackQuery) -> Result<()> {
        if let Err(e) = self.client.answer_callback_query(&query.id).await {
            debug!(error = %e, "answerCallbackQuery failed");
        }
        let Some(message) = query.message else {
            return Ok(());
        };
        let chat_id = message.chat.id.to_string();
        let data = query.data.unwrap_or_default();

        match Callback::parse(&data) {
            Some(Callback::Format { pending, format }) => {
                self.start_download(&chat_id, message.message_id, pending, format)
                    .await
            }
            Some(Callback::SendFile(id)) => {
                self.send_file(&chat_id, message.message_id, id, false)
                    .await
            }
            Some(Callback::SendLarge(id)) => {
                self.send_file(&chat_id, message.message_id, id, true).await
            }
            Some(Callback::SendLink(id)) => {
                self.send_link(&chat_id, message.message_id, id).await
            }
            None => self
                .reply(&chat_id, "❌ Invalid callback data. Please try again.")
                .await
                .map(drop),
        }
    }

    async fn start_download(
        &self,
        chat_id: &str,
        message_id: i64,
        pending_id: &str,
        format: &str,
    ) -> Result<()> {
        let Some(selection) = self.pending.lock().await.remove(pending_id) else {
            return self
                .reply(chat_id, "❌ Selection expired. Please send the URL again.")
                .await
                .map(drop);
        };

        // Subscribe before submitting so no event of the new job is missed
        let events = self.relay.subscribe();
        let id = match self
            .relay
            .submit(&selection.url, Some(&selector_for(format)))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                return self
                    .client
                    .edit_message_text(chat_id, message_id, &format!("❌ {e}"), None)
                    .await;
            }
        };
        info!(job_id = %id, chat_id, format, "download started from chat");
        self.active
            .lock()
            .await
            .insert(chat_id.to_string(), id.clone());
        self.client
            .edit_message_text(chat_id, message_id, "📥 Starting download...", None)
            .await?;

        let snapshot = self.watch_job(chat_id, message_id, &id, events).await;
        {
            let mut active = self.active.lock().await;
            if active.get(chat_id) == Some(&id) {
                active.remove(chat_id);
            }
        }
        self.report_terminal(chat_id, message_id, &id, &snapshot)
            .await
    }

    /// Edit the status message with progress until the job ends
    ///
    /// Edits follow the upload throttling rule: every notify interval, on
    /// each new 10% step, once at 99% and on completion.
    async fn watch_job(
        &self,
        chat_id: &str,
        message_id: i64,
        id: &JobId,
        mut events: broadcast::Receiver<Event>,
    ) -> JobSnapshot {
        let interval = self.relay.config().delivery.notify_interval;
        let mut tracker = ProgressTracker::new(interval, Instant::now());

        loop {
            let snapshot = self.relay.progress(id);
            if snapshot.status.is_terminal() {
                return snapshot;
            }

            match tokio::time::timeout(WATCH_TICK, events.recv()).await {
                Ok(Ok(Event::JobProgress {
                    id: event_id,
                    downloaded_bytes,
                    total_bytes,
                    ..
                })) if &event_id == id => {
                    if tracker
                        .observe(downloaded_bytes, total_bytes, Instant::now())
                        .is_some()
                    {
                        let text = download_progress_text(&self.relay.progress(id));
                        if let Err(e) = self
                            .client
                            .edit_message_text(chat_id, message_id, &text, None)
                            .await
                        {
                            debug!(job_id = %id, error = %e, "progress edit failed");
                        }
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return self.relay.progress(id),
                _ => {}
            }
        }
    }

    async fn report_terminal(
        &self,
        chat_id: &str,
        message_id: i64,
        id: &JobId,
        snapshot: &JobSnapshot,
    ) -> Result<()> {
        match snapshot.status {
            JobStatus::Completed => match self.relay.delivery_options(id).await {
                Ok(decision) => {
                    self.client
                        .edit_message_text(
                            chat_id,
                            message_id,
                            &completion_text(snapshot, &decision),
                            Some(&delivery_keyboard(id, &decision)),
                        )
                        .await
                }
                Err(e) => {
                    self.client
                        .edit_message_text(
                            chat_id,
                            message_id,
                            &format!("❌ File not found after download: {e}"),
                            None,
                        )
                        .await
                }
            },
            JobStatus::Cancelled => {
                self.client
                    .edit_message_text(chat_id, message_id, "🚫 Download cancelled", None)
                    .await
            }
            _ => {
                let reason = snapshot.error.as_deref().unwrap_or("unknown error");
                self.client
                    .edit_message_text(
                        chat_id,
                        message_id,
                        &format!("❌ Download failed: {reason}"),
                        None,
                    )
                    .await
            }
        }
    }

    async fn send_link(&self, chat_id: &str, message_id: i64, raw_id: &str) -> Result<()> {
        let artifact = match JobId::parse(raw_id) {
            Ok(id) => self.relay.artifact(&id).await,
            Err(e) => Err(e),
        };
        let artifact = match artifact {
            Ok(artifact) => artifact,
            Err(_) => {
                return self
                    .reply(chat_id, "❌ File not found or expired")
                    .await
                    .map(drop);
            }
        };

        let url = self.relay.link_for(&artifact.job_id);
        let (text, markup) = link_message(
            &artifact.display_name,
            artifact.size,
            &url,
            self.relay.config().storage.file_validity_days,
        );
        self.client
            .edit_message_text(chat_id, message_id, &text, markup.as_ref())
            .await
    }

    async fn send_file(
        &self,
        chat_id: &str,
        message_id: i64,
        raw_id: &str,
        large: bool,
    ) -> Result<()> {
        let Ok(id) = JobId::parse(raw_id) else {
            return self
                .reply(chat_id, "❌ File not found or expired")
                .await
                .map(drop);
        };
        let decision = match self.relay.delivery_options(&id).await {
            Ok(decision) => decision,
            Err(Error::NotFound(_) | Error::ArtifactMissing { .. }) => {
                return self
                    .reply(chat_id, "❌ File not found or expired")
                    .await
                    .map(drop);
            }
            Err(e) => return Err(e),
        };

        let option = match large {
            false => DeliveryOption::Direct,
            true if decision.offers(DeliveryOption::LargePayload) => DeliveryOption::LargePayload,
            true => DeliveryOption::SplitUpload,
        };
        let name = self
            .relay
            .artifact(&id)
            .await
            .map(|a| a.display_name)
            .unwrap_or_else(|_| id.to_string());

        self.client
            .edit_message_text(chat_id, message_id, "⬆️ Preparing upload...", None)
            .await?;
        let notifier: Arc<dyn UploadNotifier> = Arc::new(StatusMessageNotifier {
            client: self.client.clone(),
            chat_id: chat_id.to_string(),
            message_id,
            name: name.clone(),
        });

        let outcome = self
            .relay
            .deliver(
                &id,
                option,
                DeliveryTarget {
                    chat_id: chat_id.to_string(),
                },
                Some(notifier),
            )
            .await?;

        let (text, markup) = match outcome {
            DeliveryOutcome::Delivered { link, parts, .. } => {
                let mut text = format!("✅ File sent!\n\n📹 {name}");
                if parts > 1 {
                    text.push_str(&format!("\n📦 Sent in {parts} parts"));
                }
                let markup = match link {
                    Some(link) if !is_local_link(&link) => Some(InlineKeyboardMarkup::column(
                        vec![InlineKeyboardButton::link("📺 Open in Channel", link)],
                    )),
                    Some(link) => {
                        text.push_str(&format!("\n🔗 {link}"));
                        None
                    }
                    None => None,
                };
                (text, markup)
            }
            DeliveryOutcome::Link { url } => {
                let size = self.relay.artifact(&id).await.map(|a| a.size).unwrap_or(0);
                link_message(
                    &name,
                    size,
                    &url,
                    self.relay.config().storage.file_validity_days,
                )
            }
            DeliveryOutcome::Failed {
                reason, fallback, ..
            } => {
                let text = format!("❌ Upload failed: {reason}");
                let markup = (fallback == Some(DeliveryOption::Link)).then(|| {
                    InlineKeyboardMarkup::column(vec![InlineKeyboardButton::callback(
                        "🔗 Get Download Link Instead",
                        format!("send_link:{id}"),
                    )])
                });
                (text, markup)
            }
        };
        self.client
            .edit_message_text(chat_id, message_id, &text, markup.as_ref())
            .await
    }
}
