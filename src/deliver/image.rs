// src/deliver/image.rs
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;

use super::{FetchedImage, ImageFetcher};
use crate::ingest::normalize::format_from_mime;
use crate::ingest::types::NewsItem;

// Some publishers refuse image requests without a browser user agent.
const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, item: &NewsItem) -> Result<Option<FetchedImage>> {
        let Some(url) = item.image_url.as_deref() else {
            return Ok(None);
        };

        let rsp = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_UA)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("GET image {url}"))?
            .error_for_status()
            .with_context(|| format!("GET image {url} non-2xx"))?;

        let content_type = rsp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = rsp.bytes().await.context("reading image body")?;
        if bytes.is_empty() {
            tracing::debug!(target: "deliver", %url, "empty image body");
            return Ok(None);
        }

        let format = confirm_format(&bytes, content_type.as_deref(), item.image_format.as_deref());
        Ok(format.map(|format| FetchedImage {
            bytes: bytes.to_vec(),
            format,
        }))
    }
}

/// Magic bytes first, then the `Content-Type` subtype, then the feed's hint.
pub fn confirm_format(bytes: &[u8], content_type: Option<&str>, hint: Option<&str>) -> Option<String> {
    sniff_format(bytes)
        .map(str::to_string)
        .or_else(|| content_type.and_then(format_from_mime))
        .or_else(|| hint.map(str::to_string))
}

fn sniff_format(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("png"),
        [b'G', b'I', b'F', b'8', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}
