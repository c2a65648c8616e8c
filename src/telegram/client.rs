use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::types::{ApiResponse, File, Message, SendMessage, SendPhoto};

#[async_trait]
pub trait BotApi: Send + Sync {
    async fn send_message(&self, message: &SendMessage) -> anyhow::Result<Message>;
    async fn send_photo(&self, photo: &SendPhoto) -> anyhow::Result<Message>;
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;
    async fn answer_callback_query(&self, callback_query_id: &str) -> anyhow::Result<()>;
    /// Resolves the file path through `getFile` and downloads the content.
    async fn download_file(&self, file_id: &str) -> anyhow::Result<Bytes>;
    async fn set_webhook(&self, url: &str) -> anyhow::Result<()>;
}

/// Bot API over HTTPS JSON.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> anyhow::Result<T>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response: ApiResponse<T> = self
            .http
            .post(url)
            .json(params)
            .send()
            .await
            .with_context(|| format!("telegram {method} request failed"))?
            .json()
            .await
            .with_context(|| format!("telegram {method} returned an unreadable body"))?;

        if !response.ok {
            bail!(
                "telegram {method} failed: {}",
                response.description.unwrap_or_default()
            );
        }
        response
            .result
            .ok_or_else(|| anyhow!("telegram {method} returned no result"))
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn send_message(&self, message: &SendMessage) -> anyhow::Result<Message> {
        self.call("sendMessage", message).await
    }

    async fn send_photo(&self, photo: &SendPhoto) -> anyhow::Result<Message> {
        self.call("sendPhoto", photo).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> anyhow::Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> anyhow::Result<Bytes> {
        let file: File = self.call("getFile", &json!({ "file_id": file_id })).await?;
        let path = file.file_path.context("telegram getFile returned no file path")?;

        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, path);
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to download telegram file")?
            .error_for_status()
            .context("telegram file download rejected")?
            .bytes()
            .await
            .context("failed to read telegram file")?;
        Ok(bytes)
    }

    async fn set_webhook(&self, url: &str) -> anyhow::Result<()> {
        let _: bool = self
            .call(
                "setWebhook",
                &json!({ "url": url, "drop_pending_updates": true }),
            )
            .await?;
        Ok(())
    }
}
