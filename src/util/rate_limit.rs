//! Rate limiting utilities

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

/// Max client messages per second before frames are discarded
pub const INPUT_RATE_LIMIT: u32 = 30;

/// Per-connection limiter for inbound WebSocket messages
#[derive(Clone)]
pub struct PlayerRateLimiter {
    input_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        let quota =
            Quota::per_second(NonZeroU32::new(INPUT_RATE_LIMIT).unwrap_or(NonZeroU32::MIN));
        Self {
            input_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
