mod index;
mod store;
mod ttl;

pub use index::{CacheEntry, CacheIndex, CacheIndexStore};
pub use store::{ApiCache, DiskApiCache};
pub use ttl::{parse_duration, TtlConfig};
