//! Gateway — routes inbound channel events through the media pipeline
//! and out to the dispatch protocol.

use courier_channels::dispatch::Dispatcher;
use courier_core::{
    filter::{sender_matches, SenderId},
    message::{Album, ChannelEvent, ChannelMessage},
    traits::MediaFetcher,
};
use courier_media::{acquire, collage, host, normalize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// The central gateway: filter, acquire, normalize, compose, dispatch.
pub struct Gateway {
    fetcher: Arc<dyn MediaFetcher>,
    dispatcher: Dispatcher,
    allowed_senders: Vec<SenderId>,
    hosting_dir: PathBuf,
    public_base_url: String,
    route: String,
}

impl Gateway {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        dispatcher: Dispatcher,
        allowed_senders: Vec<SenderId>,
        hosting_dir: PathBuf,
        public_base_url: String,
        route: String,
    ) -> Self {
        Self {
            fetcher,
            dispatcher,
            allowed_senders,
            hosting_dir,
            public_base_url,
            route,
        }
    }

    /// Consume channel events until the source closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<ChannelEvent>) {
        info!("gateway running");
        while let Some(event) = rx.recv().await {
            match event {
                ChannelEvent::Message(message) => self.handle_message(message).await,
                ChannelEvent::Album(album) => self.handle_album(album).await,
            }
        }
        info!("event source closed, gateway stopping");
    }

    async fn handle_message(&self, message: ChannelMessage) {
        // Grouped messages are delivered through the album path.
        if message.media_group_id.is_some() {
            return;
        }
        if !sender_matches(&message.sender, &self.allowed_senders) {
            return;
        }

        let media_url = match acquire::acquire(self.fetcher.as_ref(), &self.hosting_dir, &message)
            .await
        {
            Some(acquired) => self.normalize_and_publish(acquired.path).await,
            None => None,
        };

        // Neither text nor media: nothing to forward.
        if message.text.is_empty() && media_url.is_none() {
            return;
        }

        self.dispatcher
            .dispatch(&message.text, media_url.as_deref())
            .await;

        match message.text.lines().next() {
            Some(first) if !first.is_empty() => info!("forwarded: {first}"),
            _ => info!("forwarded media without text"),
        }
    }

    async fn handle_album(&self, album: Album) {
        let sender = album
            .messages
            .first()
            .map(|m| m.sender.clone())
            .unwrap_or_default();
        if !sender_matches(&sender, &self.allowed_senders) {
            return;
        }

        let mut paths = Vec::new();
        for message in &album.messages {
            if let Some(acquired) =
                acquire::acquire(self.fetcher.as_ref(), &self.hosting_dir, message).await
            {
                if let Some(path) = self.normalize_path(acquired.path).await {
                    paths.push(path);
                }
            }
        }

        if album.caption.is_empty() && paths.is_empty() {
            return;
        }

        let media_url = match paths.len() {
            0 => None,
            1 => self.url_for(&paths[0]),
            _ => {
                let dir = self.hosting_dir.clone();
                let inputs = paths.clone();
                match tokio::task::spawn_blocking(move || collage::compose(&dir, &inputs)).await {
                    Ok(Ok(path)) => self.url_for(&path),
                    Ok(Err(e)) => {
                        error!("collage composition failed: {e}");
                        return;
                    }
                    Err(e) => {
                        error!("collage task failed: {e}");
                        return;
                    }
                }
            }
        };

        self.dispatcher
            .dispatch(&album.caption, media_url.as_deref())
            .await;
        info!("forwarded album with {} image(s)", paths.len());
    }

    /// Normalize an acquired file, falling back to the original on a
    /// failed conversion task.
    async fn normalize_path(&self, path: PathBuf) -> Option<PathBuf> {
        let input = path.clone();
        match tokio::task::spawn_blocking(move || normalize::normalize(&input)).await {
            Ok(normalized) => Some(normalized),
            Err(e) => {
                error!("normalize task failed: {e}");
                Some(path)
            }
        }
    }

    async fn normalize_and_publish(&self, path: PathBuf) -> Option<String> {
        let normalized = self.normalize_path(path).await?;
        self.url_for(&normalized)
    }

    fn url_for(&self, path: &Path) -> Option<String> {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(filename) => Some(host::public_url(
                &self.public_base_url,
                &self.route,
                filename,
            )),
            None => {
                warn!("hosted file has no usable name: {}", path.display());
                None
            }
        }
    }
}
