// src/config/mod.rs
pub mod relay;

pub use relay::{PersistPolicy, RelayConfig, SourceCfg};
