// src/deliver/mod.rs
//! Delivery Orchestrator: image fetch, caption, send, one item at a time.
//!
//! Per-item failures are recorded in the `DeliveryReport` and never stop the
//! batch. Nothing is retried within a run.

pub mod image;
pub mod whatsapp;

use std::time::Duration;

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::error::DeliveryFailure;
use crate::ingest::types::NewsItem;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_delivered_total", "Items sent to the channel.");
        describe_counter!(
            "relay_delivery_failed_total",
            "Items skipped for missing image, image fetch or send errors."
        );
    });
}

/// Image bytes plus the format confirmed by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub format: String,
}

#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    /// `Ok(None)` means the image could not be obtained.
    async fn fetch_image(&self, item: &NewsItem) -> Result<Option<FetchedImage>>;
}

#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_news(&self, item: &NewsItem, caption: &str, image: &FetchedImage) -> Result<()>;
}

/// Bold title, optional summary, source label, link.
pub fn format_caption(item: &NewsItem) -> String {
    let mut caption = format!("*{}*\n\n", item.title);
    if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
        caption.push_str(summary);
        caption.push_str("\n\n");
    }
    caption.push_str(&format!("Fonte: {}\n", item.source));
    caption.push_str(&format!("Leia mais: {}", item.url));
    caption
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub source: String,
    pub url: String,
    pub result: Result<(), DeliveryFailure>,
}

impl ItemOutcome {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// One outcome per input item, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl DeliveryReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ItemOutcome, &DeliveryFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }
}

pub struct Deliverer {
    images: Box<dyn ImageFetcher>,
    sender: Box<dyn MessageSender>,
    pause: Duration,
}

impl Deliverer {
    pub fn new(images: Box<dyn ImageFetcher>, sender: Box<dyn MessageSender>) -> Self {
        Self {
            images,
            sender,
            pause: Duration::from_secs(2),
        }
    }

    /// Pause after every item that reached the send step.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub async fn deliver(&self, items: &[NewsItem]) -> DeliveryReport {
        ensure_metrics_described();

        let mut report = DeliveryReport {
            outcomes: Vec::with_capacity(items.len()),
        };
        for (i, item) in items.iter().enumerate() {
            tracing::info!(target: "deliver", title = %item.title, source = %item.source, "processing");
            let (result, attempted_send) = self.deliver_one(item).await;

            match &result {
                Ok(()) => {
                    tracing::info!(target: "deliver", source = %item.source, "sent");
                    counter!("relay_delivered_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(target: "deliver", source = %item.source, url = %item.url, error = %e, "not delivered");
                    counter!("relay_delivery_failed_total").increment(1);
                }
            }
            report.outcomes.push(ItemOutcome {
                source: item.source.clone(),
                url: item.url.clone(),
                result,
            });

            let is_last = i + 1 == items.len();
            if attempted_send && !is_last && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }
        report
    }

    /// Returns the outcome and whether the sender was called.
    async fn deliver_one(&self, item: &NewsItem) -> (Result<(), DeliveryFailure>, bool) {
        if item.image_url.is_none() {
            return (Err(DeliveryFailure::NoImage), false);
        }

        let image = match self.images.fetch_image(item).await {
            Ok(Some(img)) => img,
            Ok(None) => {
                return (
                    Err(DeliveryFailure::ImageFetch("no image returned".to_string())),
                    false,
                )
            }
            Err(e) => return (Err(DeliveryFailure::ImageFetch(format!("{e:#}"))), false),
        };

        let caption = format_caption(item);
        let sent = self
            .sender
            .send_news(item, &caption, &image)
            .await
            .map_err(|e| DeliveryFailure::Send(format!("{e:#}")));
        (sent, true)
    }
}
