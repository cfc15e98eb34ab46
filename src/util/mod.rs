//! Shared helpers: clocks, math, deferred actions, rate limiting

pub mod math;
pub mod rate_limit;
pub mod scheduler;
pub mod time;
