//! Multi-tier caching for the assistant's expensive boundaries.
//!
//! ```text
//! +-----------+ +-------------+ +-------------+
//! | LLM reply | | diagnostics | | screenshots |
//! +-----------+ +-------------+ +-------------+
//! +-----------+ +-------------+ +-------------+
//! |  context  | |  elements   | |    fixes    |
//! +-----------+ +-------------+ +-------------+
//!          \          |           /
//!           +------------------+
//!           |   CacheManager   |
//!           +------------------+
//! ```
//!
//! Every tier is an independent [`Cache`] with its own size and TTL.

mod manager;
mod tier;

pub use manager::{CacheManager, CacheManagerStats};
pub use tier::{Cache, CacheEntry, CacheStats, cache_key, eviction_score};
