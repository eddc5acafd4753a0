//! Per-agent token buckets over requests-per-minute and
//! tokens-per-minute, enforced before every provider dispatch.
//!
//! On denial the scheduler defers the turn with the returned wait — no
//! turn is consumed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use axe_domain::config::RateLimitConfig;

struct Bucket {
    requests: f64,
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit one request costing `estimated_tokens`.  On denial
    /// returns how long to wait before the bucket can cover it.
    pub fn admit(&self, alias: &str, estimated_tokens: u64) -> Result<(), Duration> {
        let rpm = f64::from(self.config.rpm);
        let tpm = self.config.tpm as f64;
        // A single prompt larger than one minute's allowance is admitted
        // once a full bucket is available, never starved forever.
        let token_cost = (estimated_tokens as f64).min(tpm);

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(alias.to_owned()).or_insert(Bucket {
            requests: rpm,
            tokens: tpm,
            last_refill: Instant::now(),
        });

        // Continuous refill, capped at one minute's worth.
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.requests = (bucket.requests + elapsed * rpm / 60.0).min(rpm);
        bucket.tokens = (bucket.tokens + elapsed * tpm / 60.0).min(tpm);
        bucket.last_refill = Instant::now();

        if bucket.requests >= 1.0 && bucket.tokens >= token_cost {
            bucket.requests -= 1.0;
            bucket.tokens -= token_cost;
            return Ok(());
        }

        let request_wait = if bucket.requests >= 1.0 {
            0.0
        } else {
            (1.0 - bucket.requests) * 60.0 / rpm
        };
        let token_wait = if bucket.tokens >= token_cost {
            0.0
        } else {
            (token_cost - bucket.tokens) * 60.0 / tpm
        };
        Err(Duration::from_secs_f64(request_wait.max(token_wait)))
    }

    /// Charge tokens the provider actually consumed beyond the admission
    /// estimate.
    pub fn record_actual(&self, alias: &str, estimated_tokens: u64, actual_tokens: u64) {
        if actual_tokens <= estimated_tokens {
            return;
        }
        let extra = (actual_tokens - estimated_tokens) as f64;
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get_mut(alias) {
            bucket.tokens = (bucket.tokens - extra).max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: u32, tpm: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig { rpm, tpm })
    }

    #[test]
    fn fresh_bucket_admits_up_to_rpm() {
        let rl = limiter(3, 100_000);
        assert!(rl.admit("a", 100).is_ok());
        assert!(rl.admit("a", 100).is_ok());
        assert!(rl.admit("a", 100).is_ok());
        let wait = rl.admit("a", 100).unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(21));
    }

    #[test]
    fn token_budget_denies_large_prompts() {
        let rl = limiter(100, 1_000);
        assert!(rl.admit("a", 900).is_ok());
        let wait = rl.admit("a", 900).unwrap_err();
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn buckets_are_per_agent() {
        let rl = limiter(1, 1_000_000);
        assert!(rl.admit("a", 10).is_ok());
        assert!(rl.admit("b", 10).is_ok());
        assert!(rl.admit("a", 10).is_err());
    }

    #[test]
    fn oversized_estimate_is_not_starved_forever() {
        let rl = limiter(10, 1_000);
        // Costs are clamped to one minute's allowance.
        assert!(rl.admit("a", 50_000).is_ok());
    }

    #[test]
    fn record_actual_charges_overrun() {
        let rl = limiter(100, 1_000);
        assert!(rl.admit("a", 100).is_ok());
        rl.record_actual("a", 100, 950);
        // The overrun drained the bucket.
        assert!(rl.admit("a", 500).is_err());
    }
}
