//! A single packet's fate as reconstructed from transport feedback.

use std::time::Instant;

/// One packet's send/receive outcome, normalized from either TWCC or RFC 8888
/// feedback so the rest of the bandwidth estimator doesn't care which wire
/// format produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgment {
    pub ssrc: u32,
    pub sequence_number: u16,
    pub size: usize,
    pub departure: Instant,
    pub arrival: Option<Instant>,
    /// ECN codepoint reported for the packet, 0 when not ECN-capable or unknown.
    pub ecn: u8,
    /// Frame the packet belonged to, for diagnostics. `None` when the stream
    /// has no frame-type tagger bound, or the packet's tag was evicted before
    /// this Ack was produced.
    pub frame_id: Option<u64>,
}

impl Acknowledgment {
    pub fn lost(&self) -> bool {
        self.arrival.is_none()
    }
}
