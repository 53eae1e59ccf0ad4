// src/store/memory.rs
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use super::NewsStore;
use crate::ingest::types::NewsItem;
use crate::selector::SourceCursors;

/// In-process store. Cursors are derived from the stored rows, like the
/// `get_latest_news_per_source` procedure does server-side.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<NewsItem>>,
    fail_query: bool,
    fail_insert: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<NewsItem>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Make `last_seen_per_source` fail.
    pub fn failing_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    /// Make `insert_many` fail.
    pub fn failing_insert(mut self) -> Self {
        self.fail_insert = true;
        self
    }

    pub fn rows(&self) -> Vec<NewsItem> {
        match self.rows.lock() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl NewsStore for MemoryStore {
    async fn last_seen_per_source(&self) -> Result<SourceCursors> {
        if self.fail_query {
            return Err(anyhow!("memory store: query disabled"));
        }
        Ok(self
            .rows()
            .into_iter()
            .map(|it| (it.source, it.published_time))
            .collect())
    }

    async fn insert_many(&self, items: &[NewsItem]) -> Result<()> {
        if self.fail_insert {
            return Err(anyhow!("memory store: insert disabled"));
        }
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))?;
        rows.extend_from_slice(items);
        Ok(())
    }
}
