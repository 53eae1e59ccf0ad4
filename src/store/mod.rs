// src/store/mod.rs
pub mod memory;
pub mod supabase;

use anyhow::Result;

use crate::ingest::types::NewsItem;
use crate::selector::SourceCursors;

/// Persistence for delivered/seen items. Both calls are all-or-nothing.
#[async_trait::async_trait]
pub trait NewsStore: Send + Sync {
    async fn last_seen_per_source(&self) -> Result<SourceCursors>;
    async fn insert_many(&self, items: &[NewsItem]) -> Result<()>;
}
