// src/pipeline.rs
//! One relay run: cursors -> fetch -> normalize -> select -> persist/deliver.

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::config::PersistPolicy;
use crate::deliver::{Deliverer, DeliveryReport};
use crate::error::PersistenceError;
use crate::ingest::normalize::Normalizer;
use crate::ingest::types::{FeedSource, NewsItem};
use crate::ingest::collect_candidates;
use crate::selector::select_unpublished;
use crate::store::NewsStore;

fn describe_metrics() {
    describe_counter!("relay_selected_total", "Items newer than their source cursor.");
    describe_gauge!("relay_last_run_ts", "Unix time of the last relay run.");
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_metrics);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub candidates: usize,
    pub selected: usize,
    pub persisted: usize,
    pub report: DeliveryReport,
}

pub struct Relay {
    sources: Vec<Box<dyn FeedSource>>,
    normalizer: Normalizer,
    store: Arc<dyn NewsStore>,
    deliverer: Deliverer,
    persist: PersistPolicy,
}

impl Relay {
    pub fn new(
        sources: Vec<Box<dyn FeedSource>>,
        normalizer: Normalizer,
        store: Arc<dyn NewsStore>,
        deliverer: Deliverer,
    ) -> Self {
        Self {
            sources,
            normalizer,
            store,
            deliverer,
            persist: PersistPolicy::default(),
        }
    }

    pub fn with_persist_policy(mut self, persist: PersistPolicy) -> Self {
        self.persist = persist;
        self
    }

    /// Run once. Only database failures are returned; feed, entry and
    /// delivery failures are logged and reported in the summary.
    pub async fn run_once(&self) -> Result<RunSummary, PersistenceError> {
        ensure_metrics_described();
        let cursors = self
            .store
            .last_seen_per_source()
            .await
            .map_err(PersistenceError::Query)?;
        tracing::debug!(target: "relay", sources = cursors.len(), "cursors loaded");

        let candidates = collect_candidates(&self.sources, &self.normalizer).await;
        let candidate_count = candidates.len();
        let selected = select_unpublished(candidates, &cursors);
        counter!("relay_selected_total").increment(selected.len() as u64);
        gauge!("relay_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        let mut summary = RunSummary {
            candidates: candidate_count,
            selected: selected.len(),
            ..RunSummary::default()
        };

        if selected.is_empty() {
            tracing::info!(target: "relay", candidates = candidate_count, "no new items");
            return Ok(summary);
        }
        tracing::info!(target: "relay", count = selected.len(), "new items found");

        if self.persist == PersistPolicy::BeforeDelivery {
            self.insert(&selected).await?;
            summary.persisted = selected.len();
            tracing::info!(target: "relay", count = selected.len(), "items stored");
        }

        let report = self.deliverer.deliver(&selected).await;

        if self.persist == PersistPolicy::AfterDelivery {
            let delivered: Vec<NewsItem> = selected
                .iter()
                .zip(&report.outcomes)
                .filter(|(_, o)| o.is_delivered())
                .map(|(it, _)| it.clone())
                .collect();
            self.insert(&delivered).await?;
            summary.persisted = delivered.len();
            tracing::info!(target: "relay", count = delivered.len(), "delivered items stored");
        }

        tracing::info!(
            target: "relay",
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            "run finished"
        );
        summary.report = report;
        Ok(summary)
    }

    async fn insert(&self, items: &[NewsItem]) -> Result<(), PersistenceError> {
        if items.is_empty() {
            return Ok(());
        }
        self.store
            .insert_many(items)
            .await
            .map_err(|cause| PersistenceError::Insert {
                count: items.len(),
                cause,
            })
    }
}
