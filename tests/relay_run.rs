// tests/relay_run.rs
mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use common::{FakeImages, RecordingSender};
use rss_news_relay::config::PersistPolicy;
use rss_news_relay::deliver::Deliverer;
use rss_news_relay::error::PersistenceError;
use rss_news_relay::ingest::normalize::Normalizer;
use rss_news_relay::ingest::types::{FeedSource, MediaAttachment, RawEntry};
use rss_news_relay::store::memory::MemoryStore;
use rss_news_relay::store::NewsStore;
use rss_news_relay::Relay;
use time::macros::datetime;
use time::PrimitiveDateTime;

struct ScriptedFeed {
    name: &'static str,
    entries: Vec<RawEntry>,
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>> {
        Ok(self.entries.clone())
    }
    fn name(&self) -> &str {
        self.name
    }
}

fn entry(slug: &str, published_utc: PrimitiveDateTime) -> RawEntry {
    RawEntry {
        title: Some(format!("Headline {slug}")),
        link: Some(format!("https://news.test/{slug}")),
        summary: Some("<p>Body</p>".into()),
        published: Some(published_utc),
        media: vec![MediaAttachment {
            url: format!("https://img.test/{slug}.jpg"),
            mime: Some("image/jpeg".into()),
        }],
        links: vec![],
    }
}

fn feeds() -> Vec<Box<dyn FeedSource>> {
    vec![
        Box::new(ScriptedFeed {
            name: "A",
            entries: vec![
                entry("a1", datetime!(2024-01-01 13:00)),
                entry("a2", datetime!(2024-01-01 13:05)),
            ],
        }),
        Box::new(ScriptedFeed {
            name: "B",
            entries: vec![entry("b1", datetime!(2024-01-01 12:00))],
        }),
    ]
}

fn relay(
    store: Arc<MemoryStore>,
    images: FakeImages,
    sender: RecordingSender,
    persist: PersistPolicy,
) -> Relay {
    let deliverer = Deliverer::new(Box::new(images), Box::new(sender)).with_pause(Duration::ZERO);
    Relay::new(feeds(), Normalizer::default(), store, deliverer).with_persist_policy(persist)
}

fn failing_a2() -> FakeImages {
    FakeImages {
        failing: ["https://img.test/a2.jpg".to_string()].into_iter().collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn first_run_delivers_everything_in_time_order() {
    let store = Arc::new(MemoryStore::new());
    let sender = RecordingSender::default();
    let r = relay(store.clone(), FakeImages::default(), sender.clone(), PersistPolicy::BeforeDelivery);

    let summary = r.run_once().await.expect("run ok");
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.selected, 3);
    assert_eq!(summary.persisted, 3);
    assert_eq!(summary.report.delivered_count(), 3);

    let order: Vec<_> = sender.sent().into_iter().map(|s| s.url).collect();
    assert_eq!(
        order,
        vec![
            "https://news.test/b1",
            "https://news.test/a1",
            "https://news.test/a2",
        ]
    );

    let cursors = store.last_seen_per_source().await.unwrap();
    assert_eq!(cursors.get("A"), Some("2024-01-01 10:05"));
    assert_eq!(cursors.get("B"), Some("2024-01-01 09:00"));
}

#[tokio::test]
async fn second_run_with_same_feeds_selects_nothing() {
    let store = Arc::new(MemoryStore::new());
    let sender = RecordingSender::default();
    let r = relay(store.clone(), FakeImages::default(), sender.clone(), PersistPolicy::BeforeDelivery);

    r.run_once().await.unwrap();
    let again = r.run_once().await.unwrap();
    assert_eq!(again.selected, 0);
    assert_eq!(again.persisted, 0);
    assert!(again.report.outcomes.is_empty());
    assert_eq!(store.rows().len(), 3);
    assert_eq!(sender.sent().len(), 3);
}

#[tokio::test]
async fn item_marked_seen_before_delivery_is_never_retried() {
    let store = Arc::new(MemoryStore::new());

    let first = RecordingSender::default();
    let r = relay(store.clone(), failing_a2(), first.clone(), PersistPolicy::BeforeDelivery);
    let summary = r.run_once().await.unwrap();
    assert_eq!(summary.report.failed_count(), 1);
    assert!(
        store.rows().iter().any(|i| i.url == "https://news.test/a2"),
        "failed item is already stored"
    );

    // The image would now download fine, but the cursor already covers a2.
    let second = RecordingSender::default();
    let r = relay(store.clone(), FakeImages::default(), second.clone(), PersistPolicy::BeforeDelivery);
    let summary = r.run_once().await.unwrap();
    assert_eq!(summary.selected, 0);
    assert!(second.sent().is_empty());
}

#[tokio::test]
async fn persisting_after_delivery_retries_failed_newest_item() {
    let store = Arc::new(MemoryStore::new());

    let r = relay(store.clone(), failing_a2(), RecordingSender::default(), PersistPolicy::AfterDelivery);
    let summary = r.run_once().await.unwrap();
    assert_eq!(summary.persisted, 2);
    assert!(store.rows().iter().all(|i| i.url != "https://news.test/a2"));

    let second = RecordingSender::default();
    let r = relay(store.clone(), FakeImages::default(), second.clone(), PersistPolicy::AfterDelivery);
    let summary = r.run_once().await.unwrap();
    assert_eq!(summary.selected, 1);
    assert_eq!(
        second.sent().into_iter().map(|s| s.url).collect::<Vec<_>>(),
        vec!["https://news.test/a2"]
    );
}

#[tokio::test]
async fn cursor_query_failure_aborts_before_delivery() {
    let store = Arc::new(MemoryStore::new().failing_query());
    let sender = RecordingSender::default();
    let r = relay(store, FakeImages::default(), sender.clone(), PersistPolicy::BeforeDelivery);

    let err = r.run_once().await.unwrap_err();
    assert!(matches!(err, PersistenceError::Query(_)));
    assert!(sender.sent().is_empty());
}

#[tokio::test]
async fn insert_failure_aborts_before_delivery() {
    let store = Arc::new(MemoryStore::new().failing_insert());
    let sender = RecordingSender::default();
    let r = relay(store.clone(), FakeImages::default(), sender.clone(), PersistPolicy::BeforeDelivery);

    let err = r.run_once().await.unwrap_err();
    assert!(matches!(err, PersistenceError::Insert { count: 3, .. }));
    assert!(sender.sent().is_empty());
    assert!(store.rows().is_empty());
}

#[tokio::test]
async fn known_source_only_gets_newer_items() {
    let mut seen = common::news("A", "2024-01-01 10:00");
    seen.url = "https://news.test/a1".into();
    let store = Arc::new(MemoryStore::with_rows(vec![seen]));
    let sender = RecordingSender::default();
    let r = relay(store, FakeImages::default(), sender.clone(), PersistPolicy::BeforeDelivery);

    let summary = r.run_once().await.unwrap();
    assert_eq!(summary.selected, 2);
    assert_eq!(
        sender.sent().into_iter().map(|s| s.url).collect::<Vec<_>>(),
        vec!["https://news.test/b1", "https://news.test/a2"]
    );
}
