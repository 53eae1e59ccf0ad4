// src/ingest/normalize.rs
//! Item Normalizer: one `RawEntry` in, one `NewsItem` out.
//!
//! Published times arrive as UTC calendar components and leave as
//! `YYYY-MM-DD HH:MM` shifted to UTC-3, with no offset in the string.

use std::collections::HashMap;

use time::{Duration, PrimitiveDateTime};

use crate::error::MalformedEntry;
use crate::ingest::clean_html;
use crate::ingest::types::{EntryLink, MediaAttachment, NewsItem, RawEntry};

/// Hours subtracted from UTC to get the relay's local time.
pub const LOCAL_UTC_OFFSET_HOURS: i64 = 3;

const KNOWN_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Image URL and its short format token (`jpg`, `png`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub format: String,
}

impl ImageRef {
    /// Builds a reference when a format can be derived from the URL.
    pub fn from_url(url: &str) -> Option<Self> {
        let format = format_from_url(url)?;
        Some(Self {
            url: url.to_string(),
            format,
        })
    }
}

/// Fallback image per source name.
#[derive(Debug, Clone, Default)]
pub struct DefaultImages {
    by_source: HashMap<String, ImageRef>,
}

impl DefaultImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, image: ImageRef) {
        self.by_source.insert(source.into(), image);
    }

    pub fn get(&self, source: &str) -> Option<&ImageRef> {
        self.by_source.get(source)
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    defaults: DefaultImages,
}

impl Normalizer {
    pub fn new(defaults: DefaultImages) -> Self {
        Self { defaults }
    }

    pub fn normalize(&self, raw: RawEntry, source: &str) -> Result<NewsItem, MalformedEntry> {
        let malformed = |missing| MalformedEntry {
            source_name: source.to_string(),
            missing,
        };

        let title = extract_title(&raw).ok_or_else(|| malformed("title"))?;
        let url = extract_link(&raw).ok_or_else(|| malformed("link"))?;
        let published = raw.published.ok_or_else(|| malformed("published time"))?;

        let image = resolve_image(&raw.media, &raw.links)
            .or_else(|| self.defaults.get(source).cloned());
        let (image_url, image_format) = match image {
            Some(ImageRef { url, format }) => (Some(url), Some(format)),
            None => (None, None),
        };

        Ok(NewsItem {
            title,
            url,
            source: source.to_string(),
            published_time: local_timestamp(published),
            summary: extract_summary(&raw),
            image_url,
            image_format,
        })
    }
}

fn extract_title(raw: &RawEntry) -> Option<String> {
    raw.title
        .as_deref()
        .map(clean_html)
        .filter(|t| !t.is_empty())
}

fn extract_link(raw: &RawEntry) -> Option<String> {
    raw.link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

fn extract_summary(raw: &RawEntry) -> Option<String> {
    raw.summary
        .as_deref()
        .map(clean_html)
        .filter(|s| !s.is_empty())
}

/// Media attachments first, then links typed `image/*`.
pub fn resolve_image(media: &[MediaAttachment], links: &[EntryLink]) -> Option<ImageRef> {
    let from_media = media.iter().find_map(|m| {
        if m.url.trim().is_empty() {
            return None;
        }
        let format = format_from_url(&m.url).or_else(|| m.mime.as_deref().and_then(format_from_mime))?;
        Some(ImageRef {
            url: m.url.trim().to_string(),
            format,
        })
    });
    if from_media.is_some() {
        return from_media;
    }

    links.iter().find_map(|l| {
        let mime = l.mime.as_deref()?;
        if l.href.trim().is_empty() || !mime.trim().to_ascii_lowercase().starts_with("image/") {
            return None;
        }
        let format = format_from_url(&l.href).or_else(|| format_from_mime(mime))?;
        Some(ImageRef {
            url: l.href.trim().to_string(),
            format,
        })
    })
}

/// File extension of the URL path, if it is a known image extension.
pub fn format_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let (_, ext) = path.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_IMAGE_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// Subtype of an `image/*` MIME type (`image/jpeg; q=1` -> `jpeg`).
pub fn format_from_mime(mime: &str) -> Option<String> {
    let lower = mime.trim().to_ascii_lowercase();
    let subtype = lower.strip_prefix("image/")?;
    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(subtype.to_string())
}

/// UTC calendar time -> `YYYY-MM-DD HH:MM` in UTC-3.
pub fn local_timestamp(published_utc: PrimitiveDateTime) -> String {
    let local = published_utc.assume_utc() - Duration::hours(LOCAL_UTC_OFFSET_HOURS);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute()
    )
}
