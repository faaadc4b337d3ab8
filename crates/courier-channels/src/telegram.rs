//! Telegram Bot API event source.
//!
//! Uses long polling via `getUpdates`; messages sharing a
//! `media_group_id` are buffered and emitted as one album event.
//! Docs: <https://core.telegram.org/bots/api>

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use courier_core::{
    config::TelegramConfig,
    error::CourierError,
    message::{Album, AttachmentKind, AttachmentRef, ChannelEvent, ChannelMessage, SenderRef},
    traits::{EventSource, MediaFetcher},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

/// How long an album group may stay quiet before it is flushed.
const ALBUM_FLUSH_IDLE: Duration = Duration::from_millis(1500);

/// Telegram event source using the Bot API with long polling.
pub struct TelegramSource {
    config: TelegramConfig,
    client: reqwest::Client,
    base_url: String,
    /// Tracks the last update_id to avoid reprocessing.
    last_update_id: Arc<Mutex<Option<i64>>>,
}

// --- Telegram API types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    /// Posts in broadcast channels arrive under a different key.
    channel_post: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    date: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<TgPhotoSize>>,
    document: Option<TgDocument>,
    media_group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TgPhotoSize {
    file_id: String,
    width: i64,
    height: i64,
    file_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TgDocument {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TgUser {
    id: i64,
    first_name: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

impl TelegramSource {
    /// Create a new Telegram source from config.
    pub fn new(config: TelegramConfig) -> Self {
        let base_url = format!("https://api.telegram.org/bot{}", config.bot_token);
        Self {
            config,
            client: reqwest::Client::new(),
            base_url,
            last_update_id: Arc::new(Mutex::new(None)),
        }
    }
}

/// Convert a Telegram message into the relay's internal abstraction.
fn adapt_message(msg: TgMessage) -> ChannelMessage {
    let attachment = if let Some(photos) = &msg.photo {
        // Telegram sends multiple sizes; the last is the largest.
        photos.last().map(|largest| AttachmentRef {
            file_id: largest.file_id.clone(),
            kind: AttachmentKind::Photo,
            file_name: None,
            mime_type: None,
        })
    } else {
        msg.document.as_ref().map(|doc| AttachmentRef {
            file_id: doc.file_id.clone(),
            kind: AttachmentKind::Document,
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.clone(),
        })
    };

    let sender = msg
        .from
        .as_ref()
        .map(|user| SenderRef {
            id: Some(user.id),
            username: user.username.clone(),
        })
        .unwrap_or_default();

    let timestamp = Utc
        .timestamp_opt(msg.date, 0)
        .single()
        .unwrap_or_else(Utc::now);

    ChannelMessage {
        id: msg.message_id,
        chat_id: msg.chat.id,
        text: msg.text.or(msg.caption).unwrap_or_default(),
        sender,
        attachment,
        media_group_id: msg.media_group_id,
        timestamp,
    }
}

/// Buffers album members until their group goes quiet.
#[derive(Default)]
struct AlbumAggregator {
    pending: HashMap<String, PendingAlbum>,
}

struct PendingAlbum {
    messages: Vec<ChannelMessage>,
    last_seen: Instant,
}

impl AlbumAggregator {
    fn push(&mut self, message: ChannelMessage, now: Instant) {
        let Some(group_id) = message.media_group_id.clone() else {
            return;
        };
        let pending = self.pending.entry(group_id).or_insert(PendingAlbum {
            messages: Vec::new(),
            last_seen: now,
        });
        pending.messages.push(message);
        pending.last_seen = now;
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain every group that has been quiet for at least `idle`.
    ///
    /// The combined caption is the first non-empty caption among the
    /// members, matching how the platform attaches album captions.
    fn flush_idle(&mut self, idle: Duration, now: Instant) -> Vec<Album> {
        let ready: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) >= idle)
            .map(|(id, _)| id.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|pending| {
                let caption = pending
                    .messages
                    .iter()
                    .map(|m| m.text.clone())
                    .find(|t| !t.is_empty())
                    .unwrap_or_default();
                Album {
                    caption,
                    messages: pending.messages,
                }
            })
            .collect()
    }
}

#[async_trait]
impl EventSource for TelegramSource {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<mpsc::Receiver<ChannelEvent>, CourierError> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let chat_ids = self.config.chat_ids.clone();
        let last_update_id = self.last_update_id.clone();

        info!("Telegram source starting long polling for chats {chat_ids:?}");

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;
            let mut aggregator = AlbumAggregator::default();

            loop {
                let last = last_update_id.lock().await;
                let offset = last.map(|id| id + 1);
                drop(last);

                // Poll with a short timeout while albums are buffered so
                // the idle flush is not starved by a 30 s long poll.
                let poll_timeout: u64 = if aggregator.has_pending() { 1 } else { 30 };

                let mut url = format!("{base_url}/getUpdates?timeout={poll_timeout}");
                if let Some(off) = offset {
                    url.push_str(&format!("&offset={off}"));
                }

                let resp = match client
                    .get(&url)
                    .timeout(Duration::from_secs(poll_timeout + 5))
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        error!("telegram poll error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                let body: TgResponse<Vec<TgUpdate>> = match resp.json().await {
                    Ok(b) => b,
                    Err(e) => {
                        error!("telegram parse error (retry in {backoff_secs}s): {e}");
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(60);
                        continue;
                    }
                };

                if !body.ok {
                    error!(
                        "telegram API error (retry in {backoff_secs}s): {}",
                        body.description.unwrap_or_default()
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(60);
                    continue;
                }

                // Successful poll — reset backoff.
                backoff_secs = 1;

                let updates = body.result.unwrap_or_default();

                if let Some(last_update) = updates.last() {
                    *last_update_id.lock().await = Some(last_update.update_id);
                }

                let now = Instant::now();

                for update in updates {
                    let msg = match update.message.or(update.channel_post) {
                        Some(m) => m,
                        None => continue,
                    };

                    // Subscription-level chat allow-list.
                    if !chat_ids.contains(&msg.chat.id) {
                        continue;
                    }

                    let message = adapt_message(msg);

                    if message.media_group_id.is_some() {
                        aggregator.push(message, now);
                        continue;
                    }

                    if tx.send(ChannelEvent::Message(message)).await.is_err() {
                        info!("telegram receiver dropped, stopping poll");
                        return;
                    }
                }

                for album in aggregator.flush_idle(ALBUM_FLUSH_IDLE, Instant::now()) {
                    info!("album complete with {} message(s)", album.messages.len());
                    if tx.send(ChannelEvent::Album(album)).await.is_err() {
                        info!("telegram receiver dropped, stopping poll");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl MediaFetcher for TelegramSource {
    /// Download attachment bytes: `getFile` for the path, then fetch.
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, CourierError> {
        let url = format!("{}/getFile?file_id={}", self.base_url, attachment.file_id);
        let resp: TgResponse<TgFile> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CourierError::Channel(format!("telegram getFile failed: {e}")))?
            .json()
            .await
            .map_err(|e| CourierError::Channel(format!("telegram getFile parse failed: {e}")))?;

        let file_path = resp
            .result
            .and_then(|f| f.file_path)
            .ok_or_else(|| CourierError::Channel("telegram getFile returned no file_path".into()))?;

        let download_url = format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.config.bot_token
        );
        let bytes = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| CourierError::Channel(format!("telegram file download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| CourierError::Channel(format!("telegram file read failed: {e}")))?;

        Ok(bytes.to_vec())
    }
}
