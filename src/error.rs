// src/error.rs
use thiserror::Error;

/// A feed entry that cannot become a `NewsItem`. Skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed entry from {source_name}: missing {missing}")]
pub struct MalformedEntry {
    pub source_name: String,
    pub missing: &'static str,
}

/// Why a single item was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("no image")]
    NoImage,
    #[error("image fetch failed: {0}")]
    ImageFetch(String),
    #[error("send failed: {0}")]
    Send(String),
}

/// Database failures. These abort the run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("querying last seen per source failed: {0:#}")]
    Query(anyhow::Error),
    #[error("inserting {count} items failed: {cause:#}")]
    Insert { count: usize, cause: anyhow::Error },
}
