use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request budget shared by all upstream calls.
///
/// Callers await [`RequestThrottle::acquire`] before each request, so a burst of
/// fallback attempts across many symbols is spread over the quota window.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    requests_per_minute: u32,
}

impl RequestThrottle {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                Duration::from_secs(60),
                requests_per_minute,
            ))),
            requests_per_minute: requests_per_minute.max(1),
        }
    }

    /// Wait until one request fits in the budget.
    pub async fn acquire(&self) {
        if self.limiter.check().is_ok() {
            return;
        }

        tracing::debug!(
            requests_per_minute = self.requests_per_minute,
            "request budget exhausted, waiting for capacity"
        );
        self.limiter.until_ready().await;
    }

    /// Take one request from the budget without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
