//! Transport-layer feedback packets (RTPFB, PT=205): generic NACK, TWCC, and
//! RFC 8888 congestion-control feedback, grouped by feedback message type.

pub mod cc_feedback_report;
pub mod transport_layer_cc;
pub mod transport_layer_nack;

pub use cc_feedback_report::CcFeedbackReport;
pub use transport_layer_cc::TransportLayerCc;
pub use transport_layer_nack::{NackPair, TransportLayerNack};
