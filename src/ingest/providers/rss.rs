// src/ingest/providers/rss.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::ingest::types::{EntryLink, FeedSource, MediaAttachment, RawEntry};

/// RSS 2.0 / Atom feed, fetched over HTTP or parsed from an in-memory fixture.
pub struct RssFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeed {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>> {
        match &self.mode {
            Mode::Fixture(s) => parse_entries(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?
                    .error_for_status()
                    .with_context(|| format!("GET {url} non-2xx"))?
                    .text()
                    .await
                    .with_context(|| format!("reading body of {url}"))?;
                parse_entries(&body).with_context(|| format!("parsing feed {}", self.name))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Summary,
    Content,
    Published,
    Updated,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" | b"summary" => Some(Self::Summary),
            b"content:encoded" | b"content" => Some(Self::Content),
            b"pubDate" | b"published" => Some(Self::Published),
            b"updated" | b"dc:date" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// Extract the `<item>`/`<entry>` elements of a feed document.
pub fn parse_entries(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                if matches!(name.as_ref(), b"item" | b"entry") {
                    current = Some(RawEntry::default());
                    field = None;
                } else if let Some(entry) = current.as_mut() {
                    collect_attributes(entry, &e);
                    field = Field::from_name(name.as_ref());
                    text.clear();
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    collect_attributes(entry, &e);
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    text.push_str(&unescape_lenient(&t));
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if matches!(name.as_ref(), b"item" | b"entry") {
                    if let Some(entry) = current.take() {
                        out.push(entry);
                    }
                    field = None;
                } else if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    if Field::from_name(name.as_ref()) == Some(f) {
                        apply_field(entry, f, &text);
                        field = None;
                        text.clear();
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "xml error at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }

    Ok(out)
}

fn apply_field(entry: &mut RawEntry, field: Field, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match field {
        Field::Title => {
            entry.title.get_or_insert_with(|| text.to_string());
        }
        Field::Link => {
            entry.link.get_or_insert_with(|| text.to_string());
        }
        Field::Summary => entry.summary = Some(text.to_string()),
        Field::Content => {
            entry.summary.get_or_insert_with(|| text.to_string());
        }
        Field::Published => {
            if let Some(ts) = parse_published(text) {
                entry.published = Some(ts);
            }
        }
        Field::Updated => {
            if entry.published.is_none() {
                entry.published = parse_published(text);
            }
        }
    }
}

fn collect_attributes(entry: &mut RawEntry, e: &BytesStart<'_>) {
    match e.name().as_ref() {
        b"media:content" | b"media:thumbnail" => {
            if let Some(url) = attr(e, b"url") {
                entry.media.push(MediaAttachment {
                    url,
                    mime: attr(e, b"type"),
                });
            }
        }
        b"enclosure" => {
            if let Some(href) = attr(e, b"url") {
                entry.links.push(EntryLink {
                    href,
                    mime: attr(e, b"type"),
                    rel: Some("enclosure".to_string()),
                });
            }
        }
        // Atom links carry the target in `href`; RSS <link> has no attributes.
        b"link" => {
            if let Some(href) = attr(e, b"href") {
                let rel = attr(e, b"rel");
                let is_alternate = rel.as_deref().map_or(true, |r| r == "alternate");
                if is_alternate && entry.link.is_none() {
                    entry.link = Some(href.clone());
                }
                entry.links.push(EntryLink {
                    href,
                    mime: attr(e, b"type"),
                    rel,
                });
            }
        }
        _ => {}
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| match a.unescape_value() {
            Ok(v) => v.trim().to_string(),
            Err(_) => String::from_utf8_lossy(&a.value).trim().to_string(),
        })
        .filter(|v| !v.is_empty())
}

/// XML unescape; HTML entities such as `&nbsp;` fall back to the HTML decoder.
fn unescape_lenient(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(v) => v.into_owned(),
        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(t)).into_owned(),
    }
}

/// RFC 2822 or RFC 3339 timestamp -> UTC calendar components.
pub fn parse_published(ts: &str) -> Option<PrimitiveDateTime> {
    let ts = ts.trim();
    let dt = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .or_else(|| parse_with_chrono(ts))?;
    let utc = dt.to_offset(UtcOffset::UTC);
    Some(PrimitiveDateTime::new(utc.date(), utc.time()))
}

// chrono also accepts obsolete zone names ("EST", "PDT") seen in older feeds.
fn parse_with_chrono(ts: &str) -> Option<OffsetDateTime> {
    let parsed = chrono::DateTime::parse_from_rfc2822(ts)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(ts))
        .ok()?;
    OffsetDateTime::from_unix_timestamp(parsed.timestamp()).ok()
}
