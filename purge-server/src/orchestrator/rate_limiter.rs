use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use super::ports::{PortError, RateLimitStore};

#[derive(Clone, Copy, Debug)]
pub struct RateLimitPolicy {
    pub operation: &'static str,
    pub max_attempts: u32,
    pub window: Duration,
}

pub const DELETE_ACCOUNT_POLICY: RateLimitPolicy = RateLimitPolicy {
    operation: "delete_account",
    max_attempts: 3,
    window: Duration::from_secs(30 * 60),
};

pub const SEND_OTP_POLICY: RateLimitPolicy = RateLimitPolicy {
    operation: "send_otp",
    max_attempts: 3,
    window: Duration::from_secs(10 * 60),
};

#[derive(Clone, Copy, Debug)]
pub struct RateCheck {
    pub allowed: bool,
    pub reset_at: SystemTime,
}

impl RateCheck {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        match self.reset_at.duration_since(SystemTime::now()) {
            Ok(remaining) if remaining.subsec_nanos() > 0 => remaining.as_secs() + 1,
            Ok(remaining) => remaining.as_secs(),
            Err(_) => 0,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Records an attempt against `(policy.operation, subject_id)`, including denied ones.
    /// An unreachable store is reported as an error so callers deny the request.
    pub async fn check(
        &self,
        subject_id: Uuid,
        policy: &RateLimitPolicy,
    ) -> Result<RateCheck, PortError> {
        let (attempt_count, reset_at) = self
            .store
            .record_attempt(policy.operation, subject_id, policy.window)
            .await?;

        Ok(RateCheck {
            allowed: attempt_count <= policy.max_attempts,
            reset_at,
        })
    }
}
