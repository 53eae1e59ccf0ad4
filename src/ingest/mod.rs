// src/ingest/mod.rs
pub mod normalize;
pub mod providers;
pub mod types;

use crate::ingest::normalize::Normalizer;
use crate::ingest::types::{FeedSource, NewsItem};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up once a recorder is installed).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_entries_total", "Raw entries returned by feeds.");
        describe_counter!(
            "relay_malformed_total",
            "Entries skipped for missing title, link or publish time."
        );
        describe_counter!("relay_feed_errors_total", "Feed fetch/parse errors.");
    });
}

/// Clean feed HTML into a single line of plain text.
///
/// Paragraphs holding nothing but `<img>` tags go first (they carry photo
/// credits), then every other tag, then entities are decoded and whitespace
/// is collapsed.
pub fn clean_html(s: &str) -> String {
    static RE_IMG_PARAGRAPH: OnceCell<regex::Regex> = OnceCell::new();
    let re_img_p = RE_IMG_PARAGRAPH
        .get_or_init(|| regex::Regex::new(r"(?is)<p[^>]*>(?:\s*<img[^>]*>\s*)*</p>").unwrap());
    let out = re_img_p.replace_all(s, "");

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let out = re_tags.replace_all(&out, "");

    let out = html_escape::decode_html_entities(&out);

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Fetch every source and normalize its entries.
///
/// A failing source is logged and skipped, a malformed entry is logged and
/// skipped. The result is sorted ascending by `published_time`.
pub async fn collect_candidates(
    sources: &[Box<dyn FeedSource>],
    normalizer: &Normalizer,
) -> Vec<NewsItem> {
    ensure_metrics_described();

    let mut out = Vec::new();
    for src in sources {
        let entries = match src.fetch_entries().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, source = src.name(), "feed error");
                counter!("relay_feed_errors_total").increment(1);
                continue;
            }
        };
        counter!("relay_entries_total").increment(entries.len() as u64);

        let before = out.len();
        for raw in entries {
            match normalizer.normalize(raw, src.name()) {
                Ok(item) => out.push(item),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, "skipping entry");
                    counter!("relay_malformed_total").increment(1);
                }
            }
        }
        tracing::debug!(
            target: "ingest",
            source = src.name(),
            items = out.len() - before,
            "feed normalized"
        );
    }

    out.sort_by(|a, b| a.published_time.cmp(&b.published_time));
    out
}
