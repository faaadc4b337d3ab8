use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message observed in a monitored chat, adapted from the upstream
/// platform's schema at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Platform-assigned message ID.
    pub id: i64,
    /// The chat the message was observed in.
    pub chat_id: i64,
    /// Message text or caption. Empty if the message carries only media.
    pub text: String,
    pub sender: SenderRef,
    /// At most one downloadable attachment.
    pub attachment: Option<AttachmentRef>,
    /// Set when this message is part of an album; messages sharing the
    /// same group ID form one logical delivery.
    #[serde(default)]
    pub media_group_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Who sent a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderRef {
    pub id: Option<i64>,
    pub username: Option<String>,
}

/// Reference to a downloadable attachment on the source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Platform-specific handle used to download the bytes.
    pub file_id: String,
    pub kind: AttachmentKind,
    /// Original file name, when the platform reports one.
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Supported attachment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    Photo,
    Document,
}

/// An ordered burst of messages delivered together with one combined caption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub caption: String,
    pub messages: Vec<ChannelMessage>,
}

/// What the event source yields to the gateway.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(ChannelMessage),
    Album(Album),
}

/// A structured outbound send: body XOR template, at most one media URL.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub to: String,
    /// Freeform body for a plain send.
    pub body: Option<String>,
    /// Pre-approved template ID for a templated send.
    pub template_sid: Option<String>,
    /// JSON object mapping template variable slots to values.
    pub template_variables: Option<String>,
    pub media_url: Option<String>,
}

/// Per-recipient result of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    SentViaTemplate,
    Failed,
}
