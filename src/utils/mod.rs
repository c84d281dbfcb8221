//! Generic infrastructure shared by the pipeline.

mod ttlcache;

pub use ttlcache::{CacheStats, TtlCache};
