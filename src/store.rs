use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::ArchiveError;

/// Filesystem persistence, one subdirectory per sender under each storage
/// root. Writes for the same sender are serialized through a per-sender
/// lock; different senders proceed concurrently.
pub struct ArchiveStore {
    config: StorageConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArchiveStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn sender_lock(&self, sender: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(sender.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Appends one `timestamp;sender;text` row to the sender's message log,
    /// creating the directory and the CSV file on first write. No header row.
    pub async fn save_message(
        &self,
        sender: &str,
        timestamp: &str,
        text: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let lock = self.sender_lock(sender).await;
        let _guard = lock.lock().await;

        let dir = self.config.messages_dir.join(sender);
        ensure_dir(&dir).await?;
        let path = dir.join("messages.csv");

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| persistence(&path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record([timestamp, sender, text])
            .map_err(|e| persistence(&path, std::io::Error::other(e)))?;
        writer
            .flush()
            .map_err(|e| persistence(&path, e))?;

        info!("Message saved for {}", sender);
        Ok(path)
    }

    /// Writes recognized text to `<texts>/<sender>/<timestamp>.txt`,
    /// overwriting a file of the same name.
    pub async fn save_extracted_text(
        &self,
        sender: &str,
        timestamp: &str,
        text: &str,
    ) -> Result<PathBuf, ArchiveError> {
        let lock = self.sender_lock(sender).await;
        let _guard = lock.lock().await;

        let dir = self.config.texts_dir.join(sender);
        ensure_dir(&dir).await?;
        let path = dir.join(format!("{timestamp}.txt"));

        tokio::fs::write(&path, text)
            .await
            .map_err(|e| persistence(&path, e))?;

        info!("Extracted text saved for {}", sender);
        Ok(path)
    }

    /// Writes raw image bytes to `<images>/<sender>/<filename>`.
    pub async fn save_image(
        &self,
        sender: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ArchiveError> {
        let lock = self.sender_lock(sender).await;
        let _guard = lock.lock().await;

        let dir = self.config.images_dir.join(sender);
        ensure_dir(&dir).await?;
        let path = dir.join(filename);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| persistence(&path, e))?;

        info!("Image saved for {}", sender);
        Ok(path)
    }

    /// Serializes a JSON value to `<responses>/<sender>/<name>.json`.
    pub async fn save_json(
        &self,
        sender: &str,
        name: &str,
        value: &Value,
    ) -> Result<PathBuf, ArchiveError> {
        let lock = self.sender_lock(sender).await;
        let _guard = lock.lock().await;

        let dir = self.config.responses_dir.join(sender);
        ensure_dir(&dir).await?;
        let path = dir.join(format!("{name}.json"));

        let body = serde_json::to_vec(value)
            .map_err(|e| persistence(&path, std::io::Error::other(e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| persistence(&path, e))?;

        info!("OCR response saved for {}", sender);
        Ok(path)
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), ArchiveError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| persistence(dir, e))
}

fn persistence(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn make_store(tmp: &TempDir) -> ArchiveStore {
        ArchiveStore::new(StorageConfig {
            images_dir: tmp.path().join("images"),
            texts_dir: tmp.path().join("texts"),
            responses_dir: tmp.path().join("responses"),
            messages_dir: tmp.path().join("messages"),
        })
    }

    #[tokio::test]
    async fn test_save_message_appends_rows_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);

        store
            .save_message("alice", "2024-01-01 10:00:00", "hello")
            .await
            .unwrap();
        store
            .save_message("alice", "2024-01-01 10:00:01", "world")
            .await
            .unwrap();
        store
            .save_message("alice", "2024-01-01 10:00:02", "again")
            .await
            .unwrap();

        let content = std::fs::read_to_string(
            tmp.path().join("messages/alice/messages.csv"),
        )
        .unwrap();
        let rows: Vec<&str> = content.lines().collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "2024-01-01 10:00:00;alice;hello");
        assert_eq!(rows[1], "2024-01-01 10:00:01;alice;world");
        assert_eq!(rows[2], "2024-01-01 10:00:02;alice;again");
    }

    #[tokio::test]
    async fn test_message_logs_are_split_by_sender() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);

        store
            .save_message("alice", "2024-01-01 10:00:00", "hi")
            .await
            .unwrap();
        store
            .save_message("bob", "2024-01-01 10:00:00", "hi")
            .await
            .unwrap();

        assert!(tmp.path().join("messages/alice/messages.csv").exists());
        assert!(tmp.path().join("messages/bob/messages.csv").exists());
    }

    #[tokio::test]
    async fn test_directory_creation_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);

        let first = store
            .save_image("carol", "a.jpg", b"\xff\xd8first")
            .await
            .unwrap();
        store
            .save_image("carol", "b.jpg", b"\xff\xd8second")
            .await
            .unwrap();

        // The second write must not error or delete the prior artifact.
        assert_eq!(std::fs::read(first).unwrap(), b"\xff\xd8first");
        assert!(tmp.path().join("images/carol/b.jpg").exists());
    }

    #[tokio::test]
    async fn test_save_extracted_text_overwrites_same_name() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);

        store
            .save_extracted_text("dave", "2024-01-01 10:00:00", "draft")
            .await
            .unwrap();
        let path = store
            .save_extracted_text("dave", "2024-01-01 10:00:00", "final")
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "final");
    }

    #[tokio::test]
    async fn test_save_json_writes_serialized_value() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);

        let value = json!({"result": {"fullText": "Invoice #42"}});
        let path = store
            .save_json("erin", "2024-01-01 10:00:00", &value)
            .await
            .unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, value);
    }

    #[tokio::test]
    async fn test_sender_without_username_uses_placeholder_dir() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp);

        store
            .save_message("N/A", "2024-01-01 10:00:00", "anonymous")
            .await
            .unwrap();

        assert!(tmp.path().join("messages/N/A/messages.csv").exists());
    }
}
