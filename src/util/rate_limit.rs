//! Inbound message rate limiting

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified messages per second
pub fn create_limiter(messages_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(messages_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Snapshot publishes arrive once per client tick; leave headroom above 60Hz
pub const SNAPSHOT_RATE_LIMIT: u32 = 90;

/// Shoot requests per second a single peer may send
pub const SHOOT_RATE_LIMIT: u32 = 15;

/// Everything else (ready toggles, pongs, leave)
pub const CONTROL_RATE_LIMIT: u32 = 10;

/// Per-connection limiter state
#[derive(Clone)]
pub struct PeerRateLimiter {
    snapshot_limiter: Arc<Limiter>,
    shoot_limiter: Arc<Limiter>,
    control_limiter: Arc<Limiter>,
}

impl PeerRateLimiter {
    pub fn new() -> Self {
        Self {
            snapshot_limiter: create_limiter(SNAPSHOT_RATE_LIMIT),
            shoot_limiter: create_limiter(SHOOT_RATE_LIMIT),
            control_limiter: create_limiter(CONTROL_RATE_LIMIT),
        }
    }

    /// Check if a snapshot publish is allowed (returns true if allowed)
    pub fn check_snapshot(&self) -> bool {
        self.snapshot_limiter.check().is_ok()
    }

    /// Check if a shoot request is allowed
    pub fn check_shoot(&self) -> bool {
        self.shoot_limiter.check().is_ok()
    }

    /// Check if a control message is allowed
    pub fn check_control(&self) -> bool {
        self.control_limiter.check().is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shoot_burst_is_capped() {
        let limiter = PeerRateLimiter::new();
        let allowed = (0..100).filter(|_| limiter.check_shoot()).count();
        assert_eq!(allowed, SHOOT_RATE_LIMIT as usize);
    }

    #[test]
    fn categories_are_independent() {
        let limiter = PeerRateLimiter::new();
        while limiter.check_control() {}
        assert!(limiter.check_snapshot());
        assert!(limiter.check_shoot());
    }
}
