//! Process-wide stores shared by every pipeline run.
//!
//! - [`throttle`]: per-URL admission gate ([`RequestGate`])
//! - [`result_cache`]: TTL cache of finished feed documents ([`FeedCache`])
//!
//! Both are created once at startup and injected into the engine behind
//! their traits, so a sharded or external store can replace them without
//! touching pipeline logic.

mod result_cache;
mod throttle;

pub use result_cache::{FeedCache, ResultCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use throttle::{
    RequestGate, ThrottleGuard, Throttled, DEFAULT_THROTTLE_CAPACITY, DEFAULT_THROTTLE_WINDOW,
};
