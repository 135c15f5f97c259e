//! Result caching
//!
//! - `local`: node-local LRU cache with TTL and per-project invalidation
//! - `distributed`: cluster-wide result cache, fingerprint claims and job registry

pub mod distributed;
pub mod local;

pub use distributed::{DistributedCache, InMemoryDistributedCache};
pub use local::{AnalysisCache, CacheConfig, CacheKey, CacheStats, SharedAnalysisCache};
