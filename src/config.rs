use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub ocr: OcrConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// Long-lived Yandex Passport OAuth token, exchanged for IAM tokens.
    pub oauth_token: String,
    /// Cloud folder the recognition requests are billed against.
    pub folder_id: String,
    #[serde(default = "default_iam_url")]
    pub iam_url: String,
    #[serde(default = "default_vision_url")]
    pub vision_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    #[serde(default = "default_texts_dir")]
    pub texts_dir: PathBuf,
    #[serde(default = "default_responses_dir")]
    pub responses_dir: PathBuf,
    #[serde(default = "default_messages_dir")]
    pub messages_dir: PathBuf,
}

fn default_iam_url() -> String {
    "https://iam.api.cloud.yandex.net/iam/v1/tokens".to_string()
}

fn default_vision_url() -> String {
    "https://ocr.api.cloud.yandex.net/ocr/v1/recognizeText".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("data/images")
}

fn default_texts_dir() -> PathBuf {
    PathBuf::from("data/texts")
}

fn default_responses_dir() -> PathBuf {
    PathBuf::from("data/responses")
}

fn default_messages_dir() -> PathBuf {
    PathBuf::from("data/messages")
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        images_dir: default_images_dir(),
        texts_dir: default_texts_dir(),
        responses_dir: default_responses_dir(),
        messages_dir: default_messages_dir(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.telegram.bot_token.is_empty() {
            anyhow::bail!("telegram.bot_token must not be empty");
        }
        if config.ocr.oauth_token.is_empty() {
            anyhow::bail!("ocr.oauth_token must not be empty");
        }
        if config.ocr.folder_id.is_empty() {
            anyhow::bail!("ocr.folder_id must not be empty");
        }

        for dir in [
            &config.storage.images_dir,
            &config.storage.texts_dir,
            &config.storage.responses_dir,
            &config.storage.messages_dir,
        ] {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create storage directory: {}", dir.display())
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"

            [ocr]
            oauth_token = "y0_oauth"
            folder_id = "b1gfolder"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.ocr.iam_url,
            "https://iam.api.cloud.yandex.net/iam/v1/tokens"
        );
        assert_eq!(config.ocr.request_timeout_secs, 30);
        assert_eq!(config.storage.messages_dir, PathBuf::from("data/messages"));
    }

    #[test]
    fn test_load_rejects_empty_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [telegram]
            bot_token = ""

            [ocr]
            oauth_token = "y0_oauth"
            folder_id = "b1gfolder"
            "#,
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("bot_token"));
    }
}
