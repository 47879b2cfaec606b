//! Pre-pipeline admission control.
//!
//! A fixed-capacity token bucket per client identity, refilled at a constant
//! rate, consulted before a request enters the filter chain. Denial produces
//! an immediate rejection response without consuming pipeline resources.
//! Built atop `governor`'s keyed in-memory state store.
use std::{num::NonZeroU32, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};

use crate::core::{
    chain::synthesize_error_response,
    context::SessionContext,
    error::GatewayError,
    message::Response,
};

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// AdmissionControl defines the seam the caller consults before a request
/// enters the pipeline.
pub trait AdmissionControl: Send + Sync + 'static {
    /// Whether the identified client may proceed. Never blocks.
    fn try_acquire(&self, identity: &str) -> bool;
}

/// Admits everything; used when admission control is disabled.
pub struct OpenAdmission;

impl AdmissionControl for OpenAdmission {
    fn try_acquire(&self, _identity: &str) -> bool {
        true
    }
}

/// Token-bucket admission: each identity gets `capacity` tokens, one token
/// restored every `refill_period`.
pub struct TokenBucketAdmission {
    limiter: KeyedLimiter,
}

impl TokenBucketAdmission {
    pub fn new(capacity: u32, refill_period: Duration) -> Result<Self, String> {
        let capacity = NonZeroU32::new(capacity)
            .ok_or_else(|| "Admission 'capacity' must be greater than 0".to_string())?;
        let quota = Quota::with_period(refill_period)
            .ok_or_else(|| format!("Invalid admission refill period: {refill_period:?}"))?
            .allow_burst(capacity);

        tracing::info!(
            capacity = capacity.get(),
            refill_period = ?refill_period,
            "creating token-bucket admission controller"
        );
        Ok(Self {
            limiter: RateLimiter::keyed(quota),
        })
    }
}

impl AdmissionControl for TokenBucketAdmission {
    fn try_acquire(&self, identity: &str) -> bool {
        self.limiter.check_key(&identity.to_string()).is_ok()
    }
}

/// Immediate rejection response for a denied identity; the request never
/// enters the pipeline.
pub fn rejection_response(identity: &str, ctx: &SessionContext) -> Response {
    let err = GatewayError::AdmissionRejected {
        identity: identity.to_string(),
    };
    ctx.record_error(std::sync::Arc::new(err.clone()));
    synthesize_error_response(&err, ctx)
}
