mod policy;
mod tier;

pub use policy::{policy_for, NegativePolicyEntry, SharedWarmupSink, WarmupSink};
pub use tier::{CacheStats, CacheTier, ErrorStat, TierStats, DEFAULT_QUERY_TTL_SECONDS, DEFAULT_VIEW_TTL_SECONDS};
