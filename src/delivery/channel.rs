//! Delivery channels
//!
//! A closed set: the small-payload bot channel and the large-payload channel.
//! Both go through [`BotApiClient`] against different endpoints. Which one
//! is used is decided once by the strategy selector.

use super::progress::ProgressSink;
use super::strategy::{ChannelAvailability, LargeChannelState, Unavailability};
use super::DeliveryOption;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::telegram::BotApiClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use utoipa::ToSchema;

/// Who asked for the delivery
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryTarget {
    /// Chat of the requesting user
    pub chat_id: String,
}

/// Proof of a successful upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryReceipt {
    /// Chat the file landed in
    pub chat_id: String,
    /// Message carrying the file
    pub message_id: i64,
    /// Public link to the message, when the destination has one
    pub link: Option<String>,
}

/// A destination capable of accepting a file
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short name for logs and errors
    fn name(&self) -> &'static str;

    /// Upload `file`, reporting bytes sent through `progress`
    async fn send(
        &self,
        target: &DeliveryTarget,
        file: &Path,
        file_name: &str,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<DeliveryReceipt>;

    /// Check the channel is reachable
    async fn probe(&self) -> Result<()>;
}

/// Link to a message in a channel
///
/// `-100<n>` → `https://t.me/c/<n>/<id>`, `@name` → `https://t.me/<name>/<id>`.
/// Private chats have no linkable messages.
pub fn message_link(chat_id: &str, message_id: i64) -> Option<String> {
    if let Some(internal) = chat_id.strip_prefix("-100")
        && !internal.is_empty()
        && internal.bytes().all(|b| b.is_ascii_digit())
    {
        return Some(format!("https://t.me/c/{internal}/{message_id}"));
    }
    chat_id
        .strip_prefix('@')
        .filter(|name| !name.is_empty())
        .map(|name| format!("https://t.me/{name}/{message_id}"))
}

/// [`DeliveryChannel`] over the Bot API
pub struct BotApiChannel {
    name: &'static str,
    client: BotApiClient,
    destination: Option<String>,
}

impl BotApiChannel {
    /// Sends straight into the requesting user's chat
    pub fn direct(client: BotApiClient) -> Self {
        Self {
            name: "direct",
            client,
            destination: None,
        }
    }

    /// Sends to `channel_id` when set, otherwise to the user's chat
    pub fn large(client: BotApiClient, channel_id: Option<String>) -> Self {
        Self {
            name: "large",
            client,
            destination: channel_id,
        }
    }
}

#[async_trait]
impl DeliveryChannel for BotApiChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(
        &self,
        target: &DeliveryTarget,
        file: &Path,
        file_name: &str,
        caption: &str,
        progress: ProgressSink,
    ) -> Result<DeliveryReceipt> {
        let chat_id = self.destination.as_deref().unwrap_or(&target.chat_id);
        let message = self
            .client
            .send_document(chat_id, file, file_name, caption, progress)
            .await?;
        Ok(DeliveryReceipt {
            chat_id: chat_id.to_string(),
            message_id: message.message_id,
            link: message_link(chat_id, message.message_id),
        })
    }

    async fn probe(&self) -> Result<()> {
        self.client.get_me().await.map(|_| ())
    }
}

enum LargeSlot {
    NotConfigured,
    Incomplete(Unavailability),
    Configured(Arc<dyn DeliveryChannel>),
}

/// The configured delivery channels
pub struct ChannelSet {
    direct: Option<Arc<dyn DeliveryChannel>>,
    large: LargeSlot,
}

impl ChannelSet {
    /// Build channels from chat settings
    ///
    /// The large-payload channel counts as configured once any of its
    /// settings is present; missing pieces are reported as the reason it
    /// is unavailable.
    pub fn from_config(config: &TelegramConfig) -> Self {
        let direct = config.bot_token.as_ref().map(|token| {
            Arc::new(BotApiChannel::direct(BotApiClient::new(
                config.bot_api_url.clone(),
                token.clone(),
            ))) as Arc<dyn DeliveryChannel>
        });

        let wants_large = config.large_api_url.is_some()
            || config.api_id.is_some()
            || config.api_hash.is_some();
        let large = match (&config.large_api_url, &config.bot_token) {
            _ if !wants_large => LargeSlot::NotConfigured,
            (None, _) => LargeSlot::Incomplete(Unavailability::LibraryAbsent),
            (Some(_), None) => LargeSlot::Incomplete(Unavailability::CredentialsMissing),
            (Some(_), Some(_)) if config.api_id.is_none() || config.api_hash.is_none() => {
                LargeSlot::Incomplete(Unavailability::CredentialsMissing)
            }
            (Some(url), Some(token)) => LargeSlot::Configured(Arc::new(BotApiChannel::large(
                BotApiClient::new(url.clone(), token.clone()),
                config.channel_id.clone(),
            ))),
        };

        Self { direct, large }
    }

    /// Channel set from explicit implementations
    pub fn new(
        direct: Option<Arc<dyn DeliveryChannel>>,
        large: Option<Arc<dyn DeliveryChannel>>,
    ) -> Self {
        Self {
            direct,
            large: large.map_or(LargeSlot::NotConfigured, LargeSlot::Configured),
        }
    }

    /// No channels at all; only links can be delivered
    pub fn none() -> Self {
        Self::new(None, None)
    }

    /// Current availability; probes the large-payload channel
    pub async fn availability(&self) -> ChannelAvailability {
        let large = match &self.large {
            LargeSlot::NotConfigured => LargeChannelState::NotConfigured,
            LargeSlot::Incomplete(why) => LargeChannelState::Unavailable(*why),
            LargeSlot::Configured(channel) => match channel.probe().await {
                Ok(()) => LargeChannelState::Ready,
                Err(e) => {
                    tracing::warn!(channel = channel.name(), error = %e, "large-payload channel probe failed");
                    LargeChannelState::Unavailable(Unavailability::NotConnected)
                }
            },
        };
        ChannelAvailability {
            direct: self.direct.is_some(),
            large,
        }
    }

    /// Channel that carries `option`
    pub fn channel_for(&self, option: DeliveryOption) -> Result<Arc<dyn DeliveryChannel>> {
        let unavailable = |channel: &str, reason: &str| Error::ChannelUnavailable {
            channel: channel.to_string(),
            reason: reason.to_string(),
        };
        match option {
            DeliveryOption::Direct => self
                .direct
                .clone()
                .ok_or_else(|| unavailable("direct", "bot token not configured")),
            DeliveryOption::LargePayload | DeliveryOption::SplitUpload => match &self.large {
                LargeSlot::Configured(channel) => Ok(channel.clone()),
                LargeSlot::Incomplete(why) => Err(unavailable("large", why.describe())),
                LargeSlot::NotConfigured => Err(unavailable("large", "not configured")),
            },
            DeliveryOption::Link => Err(Error::Validation(
                "links are not sent through a channel".into(),
            )),
        }
    }
}
