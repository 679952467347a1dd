//! RTP header extensions negotiated via RFC 8285.

pub mod abs_send_time_extension;
pub mod transport_cc_extension;
