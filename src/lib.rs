// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod deliver;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod selector;
pub mod store;

pub use crate::ingest::types::NewsItem;
pub use crate::pipeline::{Relay, RunSummary};
pub use crate::selector::{select_unpublished, SourceCursors};
