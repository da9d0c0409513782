//! Per-session token bucket for submissions.

use std::collections::HashMap;
use std::sync::Mutex;

use odooxr_common::{OfficeError, SessionId};
use odooxr_config::schema::GatewayConfig;
use tokio::time::Instant;

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Each session may burst up to `burst` submissions, refilled at
/// `rate_per_sec`. Over the limit the caller gets `Throttled` with the time
/// until the next token.
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    buckets: Mutex<HashMap<SessionId, Bucket>>,
}

impl RateLimiter {
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            rate_per_sec: f64::from(rate_per_sec.max(1)),
            burst: f64::from(burst.max(1)),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.rate_per_sec, config.burst)
    }

    pub fn check(&self, session: &SessionId) -> Result<(), OfficeError> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets.entry(session.clone()).or_insert(Bucket {
            tokens: self.burst,
            refilled_at: now,
        });

        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - bucket.tokens) / self.rate_per_sec;
            Err(OfficeError::Throttled {
                retry_after_ms: (wait * 1000.0).ceil() as u64,
            })
        }
    }

    pub fn forget(&self, session: &SessionId) {
        self.buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session);
    }

    /// Drop buckets idle long enough to have refilled. A full bucket is
    /// indistinguishable from a fresh one. Returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
            bucket.tokens + elapsed * self.rate_per_sec < self.burst
        });
        before - buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
