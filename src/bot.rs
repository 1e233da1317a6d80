use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::PhotoSize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ArchiveError;
use crate::ocr::OcrClient;
use crate::store::ArchiveStore;

/// The Bot API refuses downloads above 20 MiB; reject before transferring.
const MAX_DOWNLOAD_BYTES: u32 = 20 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    config: Config,
    ocr: OcrClient,
    store: ArchiveStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let ocr = OcrClient::new(config.ocr.clone());
        let store = ArchiveStore::new(config.storage.clone());
        Self { config, ocr, store }
    }
}

/// Start the Telegram bot
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bot = Bot::new(&state.config.telegram.bot_token);

    info!("Starting Telegram bot...");

    let branches = dptree::entry()
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text))
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo));

    // Direct/group messages and channel posts both carry a Message.
    let handler = dptree::entry()
        .branch(Update::filter_message().chain(branches.clone()))
        .branch(Update::filter_channel_post().chain(branches));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("archivist"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };

    let sender = sender_name(&msg);
    let timestamp = format_timestamp(msg.date);

    info!("Text message from {}", sender);

    if let Err(e) = state.store.save_message(&sender, &timestamp, &text).await {
        warn!("Failed to save message from {}: {}", sender, e);
    }

    Ok(())
}

async fn handle_photo(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let photos = match msg.photo() {
        Some(p) => p,
        None => return Ok(()),
    };

    let sender = sender_name(&msg);
    let timestamp = format_timestamp(msg.date);

    info!("Photo message from {}", sender);

    let bytes = match download_largest_photo(&bot, photos).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to download photo from {}: {}", sender, e);
            return Ok(());
        }
    };

    if let Err(e) = state
        .store
        .save_image(&sender, &format!("{timestamp}.jpg"), &bytes)
        .await
    {
        warn!("Failed to save photo from {}: {}", sender, e);
        return Ok(());
    }

    // A failed OCR call leaves the downloaded image on disk and writes no
    // text file; a reply without any recognized text still produces one.
    match state.ocr.recognize(&bytes).await {
        Ok(recognition) => {
            if let Err(e) = state
                .store
                .save_json(&sender, &timestamp, &recognition.raw)
                .await
            {
                warn!("Failed to save OCR response for {}: {}", sender, e);
            }

            let text = recognition.text.unwrap_or_default();
            if let Err(e) = state
                .store
                .save_extracted_text(&sender, &timestamp, &text)
                .await
            {
                warn!("Failed to save extracted text for {}: {}", sender, e);
            }
        }
        Err(e) => {
            warn!("OCR failed for photo from {}: {}", sender, e);
        }
    }

    Ok(())
}

/// Downloads the largest available photo variant into memory.
async fn download_largest_photo(
    bot: &Bot,
    photos: &[PhotoSize],
) -> Result<Vec<u8>, ArchiveError> {
    // Telegram provides multiple sizes; the last one is the largest.
    let largest = photos
        .last()
        .ok_or_else(|| ArchiveError::transport("photo message carries no sizes"))?;

    let file = bot
        .get_file(largest.file.id.clone())
        .await
        .map_err(|e| ArchiveError::transport(format!("getFile failed: {e}")))?;

    if file.meta.size > MAX_DOWNLOAD_BYTES {
        return Err(ArchiveError::transport(format!(
            "file of {} bytes exceeds the {} byte bound",
            file.meta.size, MAX_DOWNLOAD_BYTES
        )));
    }

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| ArchiveError::transport(format!("download failed: {e}")))?;

    Ok(buf)
}

fn sender_name(msg: &Message) -> String {
    display_sender(msg.from.as_ref().and_then(|user| user.username.as_deref()))
}

fn display_sender(username: Option<&str>) -> String {
    username.unwrap_or("N/A").to_string()
}

fn format_timestamp(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_sender_falls_back_to_placeholder() {
        assert_eq!(display_sender(Some("alice")), "alice");
        assert_eq!(display_sender(None), "N/A");
    }

    #[test]
    fn test_timestamp_format() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(date), "2024-01-01 10:00:00");
    }
}
