//! Pacing Interceptors
//!
//! - [`leaky_bucket::LeakyBucketPacerInterceptor`]: a token-bucket pacer
//!   that smooths outgoing RTP to a target send rate published by a
//!   [`crate::cc`] bandwidth estimator.
//! - [`noop::NoopPacerInterceptor`]: forwards every outgoing packet
//!   immediately, for configurations that don't want pacing.
//!
//! # Example
//!
//! ```ignore
//! use rtc_interceptor::{Registry, LeakyBucketPacerBuilder, TargetBitrateHandle};
//!
//! let handle = TargetBitrateHandle::new(1_000_000);
//! let chain = Registry::new()
//!     .with(LeakyBucketPacerBuilder::new(handle).build())
//!     .build();
//! ```

pub mod leaky_bucket;
pub mod noop;

pub use leaky_bucket::{LeakyBucketPacerBuilder, LeakyBucketPacerInterceptor, PacerStatsHandle};
pub use noop::{NoopPacerBuilder, NoopPacerInterceptor};
