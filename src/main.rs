//! News relay binary.
//! Loads `.env` and the relay config, then runs once, or forever on
//! `RELAY_INTERVAL_SECS` when that is set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rss_news_relay::config::RelayConfig;
use rss_news_relay::deliver::image::HttpImageFetcher;
use rss_news_relay::deliver::whatsapp::WhatsAppSender;
use rss_news_relay::deliver::Deliverer;
use rss_news_relay::ingest::normalize::Normalizer;
use rss_news_relay::ingest::providers::rss::RssFeed;
use rss_news_relay::ingest::types::FeedSource;
use rss_news_relay::store::supabase::SupabaseStore;
use rss_news_relay::Relay;

const ENV_INTERVAL_SECS: &str = "RELAY_INTERVAL_SECS";

/// `RUST_LOG` filter (default `info`); `RELAY_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RELAY_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn build_relay(cfg: &RelayConfig) -> Result<Relay> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http.timeout_secs))
        .build()
        .context("building http client")?;

    let newsletter_id =
        std::env::var("NEWSLETTER_ID").map_err(|_| anyhow!("NEWSLETTER_ID missing"))?;
    let store = SupabaseStore::from_env(client.clone())?
        .with_table(cfg.store.table.clone())
        .with_timeout(cfg.http.timeout_secs);

    let sources: Vec<Box<dyn FeedSource>> = cfg
        .sources
        .iter()
        .map(|s| Box::new(RssFeed::from_url(&s.name, &s.url, client.clone())) as Box<dyn FeedSource>)
        .collect();

    let images = HttpImageFetcher::new(client.clone()).with_timeout(cfg.http.timeout_secs);
    let sender = WhatsAppSender::new(&cfg.whatsapp.base_url, newsletter_id, client)
        .with_timeout(cfg.whatsapp.timeout_secs);
    let deliverer = Deliverer::new(Box::new(images), Box::new(sender))
        .with_pause(Duration::from_secs(cfg.delivery.pause_secs));

    Ok(Relay::new(
        sources,
        Normalizer::new(cfg.default_images()),
        Arc::new(store),
        deliverer,
    )
    .with_persist_policy(cfg.delivery.persist))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::load_default()?;
    tracing::info!(
        sources = cfg.sources.len(),
        persist = ?cfg.delivery.persist,
        "relay config loaded"
    );
    let relay = build_relay(&cfg)?;

    let interval = std::env::var(ENV_INTERVAL_SECS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|s| *s > 0);

    let Some(secs) = interval else {
        relay.run_once().await?;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    loop {
        ticker.tick().await;
        if let Err(e) = relay.run_once().await {
            tracing::error!(error = %e, "relay run aborted");
        }
    }
}
