// src/config/relay.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::normalize::{DefaultImages, ImageRef};
use crate::store::supabase::DEFAULT_TABLE;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

fn default_pause_secs() -> u64 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_gateway_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_sources() -> Vec<SourceCfg> {
    vec![
        SourceCfg {
            name: "Cointelegraph".into(),
            url: "https://cointelegraph.com/rss".into(),
            default_image: None,
            default_image_format: None,
        },
        SourceCfg {
            name: "Investing.com".into(),
            url: "https://br.investing.com/rss/news_301.rss".into(),
            default_image: None,
            default_image_format: None,
        },
    ]
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SourceCfg {
    pub name: String,
    pub url: String,
    /// Used when the feed gives no image for an entry.
    #[serde(default)]
    pub default_image: Option<String>,
    /// Needed only when the default image URL has no usable extension.
    #[serde(default)]
    pub default_image_format: Option<String>,
}

/// When delivered items are written to the database.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Insert every selected item before delivery. Failed items are never retried.
    #[default]
    BeforeDelivery,
    /// Insert only delivered items, after the delivery step.
    AfterDelivery,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeliveryCfg {
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(default)]
    pub persist: PersistPolicy,
}

impl Default for DeliveryCfg {
    fn default() -> Self {
        Self {
            pause_secs: default_pause_secs(),
            persist: PersistPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WhatsAppCfg {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WhatsAppCfg {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StoreCfg {
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            table: default_table(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HttpCfg {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RelayConfig {
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceCfg>,
    #[serde(default)]
    pub delivery: DeliveryCfg,
    #[serde(default)]
    pub whatsapp: WhatsAppCfg,
    #[serde(default)]
    pub store: StoreCfg,
    #[serde(default)]
    pub http: HttpCfg,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            delivery: DeliveryCfg::default(),
            whatsapp: WhatsAppCfg::default(),
            store: StoreCfg::default(),
            http: HttpCfg::default(),
        }
    }
}

impl RelayConfig {
    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $RELAY_CONFIG_PATH
    /// 2) config/relay.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default())
    }

    pub fn parse(s: &str) -> Result<Self> {
        let cfg: RelayConfig = toml::from_str(s).context("parsing relay config")?;
        cfg.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.sources.is_empty() {
            bail!("no sources configured");
        }
        let mut seen = HashSet::new();
        for src in &mut self.sources {
            src.name = src.name.trim().to_string();
            src.url = src.url.trim().to_string();
            if src.name.is_empty() {
                bail!("source with empty name");
            }
            if src.url.is_empty() {
                bail!("source {} has an empty url", src.name);
            }
            if !seen.insert(src.name.clone()) {
                bail!("duplicate source name {}", src.name);
            }
            if src.default_image.as_deref().is_some_and(|u| u.trim().is_empty()) {
                bail!("source {} has an empty default_image", src.name);
            }
            if src.default_image.is_some() && default_image_of(src).is_none() {
                bail!(
                    "source {}: cannot tell the format of default_image; set default_image_format",
                    src.name
                );
            }
        }
        Ok(self)
    }

    /// Fallback image table handed to the normalizer.
    pub fn default_images(&self) -> DefaultImages {
        let mut out = DefaultImages::new();
        for src in &self.sources {
            if let Some(img) = default_image_of(src) {
                out.insert(src.name.clone(), img);
            }
        }
        out
    }
}

fn default_image_of(src: &SourceCfg) -> Option<ImageRef> {
    let url = src.default_image.as_deref()?.trim();
    if url.is_empty() {
        return None;
    }
    match src.default_image_format.as_deref().map(str::trim) {
        Some(fmt) if !fmt.is_empty() => Some(ImageRef {
            url: url.to_string(),
            format: fmt.to_ascii_lowercase(),
        }),
        _ => ImageRef::from_url(url),
    }
}
