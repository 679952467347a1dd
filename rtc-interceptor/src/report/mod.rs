//! RTCP Report Interceptors
//!
//! - [`sender::SenderReportInterceptor`]: periodically emits RTCP Sender Reports
//!   for each bound local stream, and filters hop-by-hop RTCP reports (receiver
//!   reports, transport-specific feedback) that should not be forwarded end-to-end.
//!
//! # Example
//!
//! ```ignore
//! use rtc_interceptor::{Registry, SenderReportBuilder};
//!
//! let chain = Registry::new()
//!     .with(SenderReportBuilder::new().build())
//!     .build();
//! ```

pub mod sender;
pub(crate) mod sender_stream;

pub use sender::{SenderReportBuilder, SenderReportInterceptor};
