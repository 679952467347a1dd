//! Google Congestion Control (GCC) style send-side bandwidth estimation.
//!
//! - [`feedback_adapter::FeedbackAdapter`] normalizes TWCC and RFC 8888
//!   feedback into a uniform stream of [`acknowledgment::Acknowledgment`]s.
//! - [`delay_controller::DelayController`] tracks the trend of one-way delay
//!   and runs a hold/increase/decrease state machine off it.
//! - [`loss_controller::LossController`] runs a simpler AIMD rule off the
//!   acknowledged loss ratio.
//! - [`bwe::BandwidthEstimatorInterceptor`] combines the two into a single
//!   target bitrate and publishes it through a
//!   [`bwe::TargetBitrateHandle`] that a pacer can subscribe to, so the
//!   estimator and the pacer never need a direct reference to each other.
//!
//! # Example
//!
//! ```ignore
//! use rtc_interceptor::{Registry, BandwidthEstimatorBuilder, TargetBitrateHandle};
//!
//! let handle = TargetBitrateHandle::new(1_000_000);
//! let chain = Registry::new()
//!     .with(BandwidthEstimatorBuilder::new(handle.clone()).build())
//!     .build();
//! ```

pub mod acknowledgment;
pub mod bwe;
pub mod delay_controller;
pub mod feedback_adapter;
pub mod loss_controller;

pub use acknowledgment::Acknowledgment;
pub use bwe::{
    BandwidthEstimatorBuilder, BandwidthEstimatorInterceptor, CongestionStatsHandle, TargetBitrateHandle,
};
