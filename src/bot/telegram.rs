//! Telegram implementation of the messaging sink

use super::sink::{MessagingSink, SendMethod, SinkError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, ParseMode, Recipient};
use teloxide::RequestError;
use tracing::debug;

const INVALID_DIMENSIONS_MARKER: &str = "PHOTO_INVALID_DIMENSIONS";

impl From<RequestError> for SinkError {
    fn from(e: RequestError) -> Self {
        let message = e.to_string();
        match e {
            RequestError::Api(api) => {
                let detail = format!("{api:?} {message}");
                if detail.contains(INVALID_DIMENSIONS_MARKER) {
                    Self::InvalidDimensions(message)
                } else {
                    Self::Rejected(message)
                }
            }
            RequestError::Network(_) | RequestError::Io(_) => Self::Network(message),
            _ => Self::Rejected(message),
        }
    }
}

/// Parse a destination: numeric chat id or `@channel` username.
///
/// # Examples
///
/// ```
/// use feed_relay::bot::telegram::parse_recipient;
/// use teloxide::types::{ChatId, Recipient};
///
/// assert_eq!(parse_recipient("-1001234"), Recipient::Id(ChatId(-1_001_234)));
/// assert_eq!(
///     parse_recipient("relay_channel"),
///     Recipient::ChannelUsername("@relay_channel".to_string())
/// );
/// ```
#[must_use]
pub fn parse_recipient(raw: &str) -> Recipient {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if raw.starts_with('@') => Recipient::ChannelUsername(raw.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{raw}")),
    }
}

/// Sink posting to one Telegram chat through the Bot API
pub struct TelegramSink {
    bot: Bot,
    recipient: Recipient,
}

impl TelegramSink {
    /// Create a sink for `chat_id` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: &str, chat_id: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            bot: Bot::with_client(token, client),
            recipient: parse_recipient(chat_id),
        })
    }
}

#[async_trait]
impl MessagingSink for TelegramSink {
    async fn send_text(&self, text: &str) -> Result<(), SinkError> {
        self.bot
            .send_message(self.recipient.clone(), text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn send_file(
        &self,
        method: SendMethod,
        path: &Path,
        caption: &str,
    ) -> Result<(), SinkError> {
        debug!(method = %method, path = %path.display(), "Uploading file");
        let file = InputFile::file(path);
        let recipient = self.recipient.clone();

        match method {
            SendMethod::Photo => {
                self.bot
                    .send_photo(recipient, file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            SendMethod::Animation => {
                self.bot
                    .send_animation(recipient, file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
            SendMethod::Video => {
                self.bot
                    .send_video(recipient, file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .supports_streaming(true)
                    .await?;
            }
            SendMethod::Document => {
                self.bot
                    .send_document(recipient, file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_album(&self, paths: &[PathBuf], caption: &str) -> Result<(), SinkError> {
        let media: Vec<InputMedia> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let photo = InputMediaPhoto::new(InputFile::file(path));
                let photo = if i == 0 {
                    photo.caption(caption).parse_mode(ParseMode::Html)
                } else {
                    photo
                };
                InputMedia::Photo(photo)
            })
            .collect();

        debug!(count = media.len(), "Uploading album");
        self.bot
            .send_media_group(self.recipient.clone(), media)
            .await?;
        Ok(())
    }
}
