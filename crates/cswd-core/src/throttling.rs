use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

/// Cooperative pacing toward remote sources: at most `burst` fetches per
/// `window`, then a pause of the remaining wait plus up to `max_jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub window: Duration,
    pub burst: u32,
    pub max_jitter: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            burst: 40,
            max_jitter: Duration::from_secs(3),
        }
    }
}

type DirectRateLimiter<K> = RateLimiter<NotKeyed, InMemoryState, K, NoOpMiddleware<<K as Clock>::Instant>>;

/// Token bucket over the policy's window. Advisory: callers decide whether
/// to honor the returned pause.
pub struct Throttle<K: Clock = DefaultClock> {
    limiter: DirectRateLimiter<K>,
    clock: K,
    max_jitter: Duration,
}

impl Throttle {
    pub fn new(policy: &ThrottlePolicy) -> Self {
        Self::with_clock(policy, DefaultClock::default())
    }
}

impl<K: Clock> Throttle<K> {
    pub fn with_clock(policy: &ThrottlePolicy, clock: K) -> Self {
        let quota = quota_from_window(policy.window, policy.burst);
        Self {
            limiter: RateLimiter::direct_with_clock(quota, &clock),
            clock,
            max_jitter: policy.max_jitter,
        }
    }

    /// Takes one unit of budget, or returns how long to pause first.
    pub fn acquire(&self) -> Result<(), Duration> {
        match self.limiter.check() {
            Ok(()) => Ok(()),
            Err(not_until) => Err(not_until.wait_time_from(self.clock.now()) + self.jitter()),
        }
    }

    fn jitter(&self) -> Duration {
        let ceiling = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=ceiling))
    }
}

fn quota_from_window(window: Duration, burst: u32) -> Quota {
    let safe_limit = burst.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
