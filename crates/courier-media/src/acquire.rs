//! Attachment acquisition — downloads a message's attachment into the
//! hosting directory. Download failures are logged, never raised; the
//! pipeline continues as if the message carried no media.

use courier_core::{
    message::{AttachmentKind, AttachmentRef, ChannelMessage},
    traits::MediaFetcher,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// A downloaded attachment, stored in the hosting directory.
#[derive(Debug, Clone)]
pub struct AcquiredMedia {
    pub path: PathBuf,
    pub message_id: i64,
}

/// Download a message's attachment, if any.
///
/// The stored file name is derived from the message ID and capture
/// timestamp, so concurrent acquisitions never collide.
pub async fn acquire(
    fetcher: &dyn MediaFetcher,
    dir: &Path,
    message: &ChannelMessage,
) -> Option<AcquiredMedia> {
    let attachment = message.attachment.as_ref()?;

    let bytes = match fetcher.fetch(attachment).await {
        Ok(b) => b,
        Err(e) => {
            error!("failed to download media for message {}: {e}", message.id);
            return None;
        }
    };

    let filename = format!(
        "{}_{}{}",
        message.id,
        message.timestamp.timestamp(),
        extension_for(attachment)
    );
    let path = dir.join(filename);

    if let Err(e) = tokio::fs::write(&path, &bytes).await {
        error!("failed to store media for message {}: {e}", message.id);
        return None;
    }

    info!("downloaded media to {}", path.display());
    Some(AcquiredMedia {
        path,
        message_id: message.id,
    })
}

/// Pick a file extension from the attachment's name or mime type.
fn extension_for(attachment: &AttachmentRef) -> String {
    if let Some(ext) = attachment
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
    {
        return format!(".{}", ext.to_lowercase());
    }

    match attachment.mime_type.as_deref() {
        Some("image/jpeg") => ".jpg".to_string(),
        Some("image/png") => ".png".to_string(),
        Some("image/webp") => ".webp".to_string(),
        Some("image/gif") => ".gif".to_string(),
        _ => match attachment.kind {
            AttachmentKind::Photo => ".jpg".to_string(),
            AttachmentKind::Document => ".bin".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use courier_core::{
        error::CourierError,
        message::SenderRef,
    };

    struct FixedFetcher {
        bytes: Option<Vec<u8>>,
    }

    #[async_trait]
    impl MediaFetcher for FixedFetcher {
        async fn fetch(&self, _attachment: &AttachmentRef) -> Result<Vec<u8>, CourierError> {
            self.bytes
                .clone()
                .ok_or_else(|| CourierError::Channel("download failed".to_string()))
        }
    }

    fn message(attachment: Option<AttachmentRef>) -> ChannelMessage {
        ChannelMessage {
            id: 42,
            chat_id: -100,
            text: String::new(),
            sender: SenderRef::default(),
            attachment,
            media_group_id: None,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn photo() -> AttachmentRef {
        AttachmentRef {
            file_id: "f1".to_string(),
            kind: AttachmentKind::Photo,
            file_name: None,
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn test_acquire_writes_deterministic_name() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FixedFetcher {
            bytes: Some(vec![1, 2, 3]),
        };

        let acquired = acquire(&fetcher, dir.path(), &message(Some(photo())))
            .await
            .unwrap();

        assert_eq!(acquired.message_id, 42);
        assert_eq!(
            acquired.path.file_name().unwrap().to_str().unwrap(),
            "42_1700000000.jpg"
        );
        assert_eq!(std::fs::read(&acquired.path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_no_attachment_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FixedFetcher {
            bytes: Some(vec![1]),
        };
        assert!(acquire(&fetcher, dir.path(), &message(None)).await.is_none());
    }

    #[tokio::test]
    async fn test_download_failure_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FixedFetcher { bytes: None };
        assert!(acquire(&fetcher, dir.path(), &message(Some(photo())))
            .await
            .is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_extension_from_file_name_wins() {
        let att = AttachmentRef {
            file_id: "f".to_string(),
            kind: AttachmentKind::Document,
            file_name: Some("sticker.WEBP".to_string()),
            mime_type: Some("image/jpeg".to_string()),
        };
        assert_eq!(extension_for(&att), ".webp");
    }

    #[test]
    fn test_extension_from_mime_and_kind() {
        let mut att = photo();
        att.mime_type = Some("image/png".to_string());
        assert_eq!(extension_for(&att), ".png");

        att.mime_type = None;
        assert_eq!(extension_for(&att), ".jpg");

        att.kind = AttachmentKind::Document;
        assert_eq!(extension_for(&att), ".bin");
    }
}
