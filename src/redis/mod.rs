//! Redis backend for the distributed analysis cache
//!
//! # Architecture
//!
//! ```text
//! RedisDistributedCache ──► RedisPool (multiplexed connection, retries)
//!          │
//!          └──► LuaScripts (claim release, result index, job registry)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use kuba_olap::cache::DistributedCache;
//! use kuba_olap::redis::{RedisConfig, RedisDistributedCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisDistributedCache::new(RedisConfig::default()).await?;
//! assert_eq!(cache.backend_id(), "redis");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod scripts;
pub mod store;
pub mod util;

pub use connection::{RedisConfig, RedisPool};
pub use scripts::LuaScripts;
pub use store::RedisDistributedCache;
