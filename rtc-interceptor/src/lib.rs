#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod noop;
mod registry;

pub mod cc;
pub mod flexfec;
pub mod frametype;
pub mod nack;
pub mod pacer;
pub mod report;
pub mod stream_info;
pub mod twcc;

use shared::TransportContext;
use shared::error::Error;
use std::time::Instant;

pub use noop::NoopInterceptor;
pub use registry::Registry;
pub use stream_info::StreamInfo;

pub use cc::bwe::{
    BandwidthEstimatorBuilder, BandwidthEstimatorInterceptor, CongestionStatsHandle, TargetBitrateHandle,
};
pub use flexfec::interceptor::{FecEncoderBuilder, FecEncoderInterceptor, FecStatsHandle};
pub use frametype::tagger::{FrameTagHandle, FrameTypeTaggerBuilder, FrameTypeTaggerInterceptor};
pub use nack::responder::{NackResponderBuilder, NackResponderInterceptor};
pub use pacer::leaky_bucket::{LeakyBucketPacerBuilder, LeakyBucketPacerInterceptor, PacerStatsHandle};
pub use report::sender::{SenderReportBuilder, SenderReportInterceptor};
pub use twcc::sender::{TwccSenderBuilder, TwccSenderInterceptor};

/// The payload an interceptor chain moves: either a single outbound/inbound
/// RTP packet, or a batch of RTCP packets read off the wire together.
#[derive(Debug, Clone)]
pub enum Packet {
    Rtp(rtp::Packet),
    Rtcp(Vec<Box<dyn rtcp::packet::Packet>>),
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Packet::Rtp(a), Packet::Rtp(b)) => a == b,
            (Packet::Rtcp(a), Packet::Rtcp(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equal(y.as_ref()))
            }
            _ => false,
        }
    }
}

/// A packet together with the transport context it arrived on or should be
/// sent through, and the time it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPacket {
    pub now: Instant,
    pub transport: TransportContext,
    pub message: Packet,
}

/// Lifecycle hooks for interceptors that need to know about media streams
/// being added to or removed from the session, layered on top of the
/// `sansio::Protocol<TaggedPacket, TaggedPacket, ()>` read/write pipeline.
///
/// Every interceptor in a chain forwards calls it does not care about to
/// its inner layer; the innermost layer is always a [`NoopInterceptor`].
pub trait Interceptor: sansio::Protocol<TaggedPacket, TaggedPacket, (), Error = Error, Time = Instant>
{
    fn bind_local_stream(&mut self, info: &StreamInfo);
    fn unbind_local_stream(&mut self, info: &StreamInfo);
    fn bind_remote_stream(&mut self, info: &StreamInfo);
    fn unbind_remote_stream(&mut self, info: &StreamInfo);
}
