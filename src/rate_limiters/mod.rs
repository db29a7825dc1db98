//! Admission control for the upstream request budget.
//!
//! [`TokenBucketCore`] is the tick-driven bucket algorithm. [`AdmissionGate`]
//! binds any [`RateLimiterCore`](crate::rate_limiter_core::RateLimiterCore) to a
//! [`Clock`](crate::clock::Clock) and is the single gate every upstream call
//! passes through.
//!
//! # Thread Safety
//!
//! The bucket uses an internal mutex taken with `try_lock`. A contended call
//! returns `ContentionFailure` rather than blocking; the gate reports it as a
//! denial and the caller retries after a short backoff.

pub mod token_bucket_core;
pub use token_bucket_core::TokenBucketCore;
pub use token_bucket_core::TokenBucketCoreConfig;

pub mod admission_gate;
pub use admission_gate::AdmissionGate;
