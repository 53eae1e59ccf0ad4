// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

/// Canonical record used from selection through persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source: String,
    /// `YYYY-MM-DD HH:MM`, UTC-3. Lexical order is chronological order.
    pub published_time: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub image_format: Option<String>,
}

/// `media:content` / `media:thumbnail` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaAttachment {
    pub url: String,
    pub mime: Option<String>,
}

/// `enclosure` or Atom `<link>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryLink {
    pub href: String,
    pub mime: Option<String>,
    pub rel: Option<String>,
}

/// One feed entry as extracted from XML, before any cleaning.
/// Every field the feed may omit is explicit here; the normalizer reads nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    /// Calendar components in UTC, no offset attached.
    pub published: Option<PrimitiveDateTime>,
    pub media: Vec<MediaAttachment>,
    pub links: Vec<EntryLink>,
}

/// A named feed the relay polls.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>>;
    fn name(&self) -> &str;
}
