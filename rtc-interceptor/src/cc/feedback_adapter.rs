//! Correlates packets handed to the network with the feedback that later
//! reports their fate, producing a stream of [`Acknowledgment`]s for the
//! bandwidth estimator's delay and loss controllers.
//!
//! Two wire formats feed this adapter:
//!
//! - TWCC (`TransportLayerCc`) indexes packets by a transport-wide sequence
//!   number that is independent of any RTP SSRC, and reports a 24-bit
//!   reference clock (64ms ticks) that wraps; [`wrap24_delta`] turns
//!   consecutive reference times into a monotonic tick count anchored to the
//!   first report seen.
//! - RFC 8888 (`CcFeedbackReport`) indexes packets per-SSRC by their real RTP
//!   sequence number, and reports arrival as an offset from the report's own
//!   timestamp. This adapter approximates that timestamp as the local time
//!   the report was processed, since bridging it to the sender's departure
//!   clock would require NTP synchronization this engine does not do.

use super::acknowledgment::Acknowledgment;
use rtcp::transport_feedbacks::cc_feedback_report::CcFeedbackReport;
use rtcp::transport_feedbacks::transport_layer_cc::{SymbolStatus, TransportLayerCc};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default number of in-flight packets remembered before the oldest is
/// evicted and implicitly treated as unacknowledged.
pub const DEFAULT_HISTORY_CAPACITY: usize = 250;

#[derive(Debug, Clone, Copy)]
struct SentPacket {
    ssrc: u32,
    rtp_seq: u16,
    twcc_seq: Option<u16>,
    size: usize,
    departure: Instant,
    frame_id: Option<u64>,
}

/// Signed difference between two 24-bit values, taking wraparound into
/// account. Assumes the true gap between `previous` and `current` is less
/// than half the 24-bit range, which always holds for consecutive feedback
/// reports spaced far less than ~149 hours apart.
fn wrap24_delta(current: u32, previous: u32) -> i64 {
    let diff = current.wrapping_sub(previous) & 0x00FF_FFFF;
    if diff & 0x0080_0000 != 0 {
        diff as i64 - 0x0100_0000
    } else {
        diff as i64
    }
}

pub struct FeedbackAdapter {
    capacity: usize,
    by_rtp: HashMap<(u32, u16), SentPacket>,
    by_twcc: HashMap<u16, (u32, u16)>,
    order: VecDeque<(u32, u16)>,

    anchor: Option<Instant>,
    seen_any_report: bool,
    last_reference_time: u32,
    reference_ticks_since_anchor: i64,
}

impl Default for FeedbackAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl FeedbackAdapter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            by_rtp: HashMap::new(),
            by_twcc: HashMap::new(),
            order: VecDeque::new(),
            anchor: None,
            seen_any_report: false,
            last_reference_time: 0,
            reference_ticks_since_anchor: 0,
        }
    }

    /// Record that a packet has just been handed to the network.
    ///
    /// `twcc_seq` is the transport-wide sequence number assigned to this
    /// packet, if the stream negotiated TWCC; it is `None` for streams that
    /// only support RFC 8888 feedback. `frame_id` is the frame-type tagger's
    /// classification for this packet, if one is bound, and is carried
    /// through to the resulting [`Acknowledgment`] for diagnostics.
    pub fn on_sent(
        &mut self,
        now: Instant,
        ssrc: u32,
        rtp_seq: u16,
        twcc_seq: Option<u16>,
        size: usize,
        frame_id: Option<u64>,
    ) {
        let key = (ssrc, rtp_seq);
        let sent = SentPacket {
            ssrc,
            rtp_seq,
            twcc_seq,
            size,
            departure: now,
            frame_id,
        };

        if let Some(old) = self.by_rtp.insert(key, sent) {
            if let Some(old_twcc) = old.twcc_seq {
                self.by_twcc.remove(&old_twcc);
            }
        } else {
            self.order.push_back(key);
        }
        if let Some(t) = twcc_seq {
            self.by_twcc.insert(t, key);
        }

        self.evict_if_needed();
    }

    fn evict_if_needed(&mut self) {
        while self.order.len() > self.capacity {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            if let Some(old) = self.by_rtp.remove(&key)
                && let Some(twcc_seq) = old.twcc_seq
            {
                self.by_twcc.remove(&twcc_seq);
            }
        }
    }

    /// Non-destructive lookup: an Ack may be resolved from the same history
    /// entry more than once (e.g. a retransmitted feedback report), and
    /// entries are only ever evicted by [`Self::evict_if_needed`].
    fn get_by_twcc(&self, twcc_seq: u16) -> Option<SentPacket> {
        let key = self.by_twcc.get(&twcc_seq)?;
        self.by_rtp.get(key).copied()
    }

    fn get_by_rtp(&self, ssrc: u32, rtp_seq: u16) -> Option<SentPacket> {
        self.by_rtp.get(&(ssrc, rtp_seq)).copied()
    }

    /// Process a TWCC feedback report, returning an acknowledgment for every
    /// packet it covers that is still in our history.
    pub fn on_transport_cc_feedback(&mut self, now: Instant, fb: &TransportLayerCc) -> Vec<Acknowledgment> {
        let anchor = *self.anchor.get_or_insert(now);

        let ticks_since_anchor = if self.seen_any_report {
            self.reference_ticks_since_anchor += wrap24_delta(fb.reference_time, self.last_reference_time);
            self.reference_ticks_since_anchor
        } else {
            self.seen_any_report = true;
            self.reference_ticks_since_anchor = 0;
            0
        };
        self.last_reference_time = fb.reference_time;

        let mut clock_250us: i64 = ticks_since_anchor * 256;
        let statuses = fb.statuses();
        let mut deltas = fb.recv_deltas.iter();
        let mut acks = Vec::with_capacity(statuses.len());

        for (i, status) in statuses.iter().enumerate() {
            let twcc_seq = fb.base_sequence_number.wrapping_add(i as u16);
            let arrival = match status {
                SymbolStatus::NotReceived => None,
                SymbolStatus::SmallDelta | SymbolStatus::LargeDelta => {
                    let Some(delta) = deltas.next() else {
                        continue;
                    };
                    clock_250us += *delta as i64;
                    Some(anchor + Duration::from_micros(clock_250us.max(0) as u64 * 250))
                }
            };

            if let Some(sent) = self.get_by_twcc(twcc_seq) {
                acks.push(Acknowledgment {
                    ssrc: sent.ssrc,
                    sequence_number: sent.rtp_seq,
                    size: sent.size,
                    departure: sent.departure,
                    arrival,
                    ecn: 0,
                    frame_id: sent.frame_id,
                });
            }
        }

        acks
    }

    /// Process an RFC 8888 feedback report.
    pub fn on_rfc8888_feedback(&mut self, now: Instant, fb: &CcFeedbackReport) -> Vec<Acknowledgment> {
        let mut acks = Vec::new();

        for block in &fb.report_blocks {
            for (i, metric) in block.metrics.iter().enumerate() {
                let seq = block.begin_sequence.wrapping_add(i as u16);
                let Some(sent) = self.get_by_rtp(block.media_ssrc, seq) else {
                    continue;
                };

                let arrival = metric
                    .received
                    .then(|| now - Duration::from_secs_f64(metric.arrival_time_offset as f64 / 1024.0));

                acks.push(Acknowledgment {
                    ssrc: sent.ssrc,
                    sequence_number: sent.rtp_seq,
                    size: sent.size,
                    departure: sent.departure,
                    arrival,
                    ecn: metric.ecn,
                    frame_id: sent.frame_id,
                });
            }
        }

        acks
    }
}
