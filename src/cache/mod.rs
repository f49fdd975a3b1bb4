pub mod account_cache;

pub use account_cache::{AccountCache, CacheStats};
