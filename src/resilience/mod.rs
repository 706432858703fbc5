//! Resilience primitives used by the node forwarder ([`crate::forwarder`]):
//! retry with backoff, a lock-free circuit breaker, a bulkhead, a timeout
//! policy, and a stack that composes all four around one operation.

mod backoff;
mod bulkhead;
mod circuit_breaker;
mod jitter;
mod retry;
mod stack;
mod timeout;

pub use backoff::{Backoff, BackoffError, BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff, MAX_BACKOFF};
pub use bulkhead::{BulkheadError, BulkheadPolicy};
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState};
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use stack::{ResilienceStack, ResilienceStackBuilder};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};
