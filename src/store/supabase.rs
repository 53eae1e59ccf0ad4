// src/store/supabase.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use super::NewsStore;
use crate::ingest::types::NewsItem;
use crate::selector::SourceCursors;

pub const DEFAULT_TABLE: &str = "crypto-news";
const LATEST_PER_SOURCE_RPC: &str = "get_latest_news_per_source";

#[derive(Debug, Deserialize)]
struct LatestRow {
    source: String,
    published_time: String,
}

/// Supabase table accessed through its PostgREST endpoint.
#[derive(Clone)]
pub struct SupabaseStore {
    base_url: String,
    api_key: String,
    table: String,
    client: Client,
    timeout: Duration,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
            client,
            timeout: Duration::from_secs(30),
        }
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_KEY`.
    pub fn from_env(client: Client) -> Result<Self> {
        let url = std::env::var("SUPABASE_URL").map_err(|_| anyhow!("SUPABASE_URL missing"))?;
        let key = std::env::var("SUPABASE_KEY").map_err(|_| anyhow!("SUPABASE_KEY missing"))?;
        Ok(Self::new(&url, key, client))
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
    }

    /// RPC call returning the latest `published_time` per source.
    pub fn cursors_request(&self) -> RequestBuilder {
        let url = format!("{}/rest/v1/rpc/{LATEST_PER_SOURCE_RPC}", self.base_url);
        self.authed(self.client.post(url)).json(&serde_json::json!({}))
    }

    /// Bulk insert of `items` into the news table.
    pub fn insert_request(&self, items: &[NewsItem]) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        self.authed(self.client.post(url))
            .header("Prefer", "return=minimal")
            .json(items)
    }
}

#[async_trait::async_trait]
impl NewsStore for SupabaseStore {
    async fn last_seen_per_source(&self) -> Result<SourceCursors> {
        let rows: Vec<LatestRow> = self
            .cursors_request()
            .send()
            .await
            .context("supabase rpc post")?
            .error_for_status()
            .context("supabase rpc non-2xx")?
            .json()
            .await
            .context("supabase rpc body")?;

        Ok(rows
            .into_iter()
            .map(|r| (r.source, r.published_time))
            .collect())
    }

    async fn insert_many(&self, items: &[NewsItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.insert_request(items)
            .send()
            .await
            .context("supabase insert post")?
            .error_for_status()
            .context("supabase insert non-2xx")?;
        Ok(())
    }
}
