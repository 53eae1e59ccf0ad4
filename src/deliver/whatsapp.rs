// src/deliver/whatsapp.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};

use super::{FetchedImage, MessageSender};
use crate::ingest::types::NewsItem;

/// Posts image messages to a WhatsApp newsletter through the local gateway's
/// `/send/image` endpoint.
#[derive(Clone)]
pub struct WhatsAppSender {
    base_url: String,
    newsletter_id: String,
    client: Client,
    timeout: Duration,
}

impl WhatsAppSender {
    pub fn new(base_url: &str, newsletter_id: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            newsletter_id: newsletter_id.into(),
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/send/image", self.base_url)
    }

    /// Multipart request for one item, ready to send.
    pub fn request(&self, caption: &str, image: &FetchedImage) -> Result<RequestBuilder> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(format!("image.{}", image.format))
            .mime_str(&format!("image/{}", image.format))
            .context("image part mime")?;

        let form = Form::new()
            .part("image", part)
            .text("phone", format!("{}@newsletter", self.newsletter_id))
            .text("caption", caption.to_string())
            .text("view_once", "false")
            .text("compress", "false");

        Ok(self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .multipart(form))
    }
}

#[async_trait::async_trait]
impl MessageSender for WhatsAppSender {
    async fn send_news(&self, item: &NewsItem, caption: &str, image: &FetchedImage) -> Result<()> {
        let rsp = self
            .request(caption, image)?
            .send()
            .await
            .context("whatsapp gateway post")?;

        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            return Err(anyhow!("whatsapp gateway HTTP {status}: {body}"));
        }
        tracing::debug!(target: "deliver", url = %item.url, "gateway accepted");
        Ok(())
    }
}
