//! Combined send-side bandwidth estimator.
//!
//! Wires the [`FeedbackAdapter`](super::feedback_adapter::FeedbackAdapter)
//! to a [`DelayController`](super::delay_controller::DelayController) and a
//! [`LossController`](super::loss_controller::LossController), taking the
//! minimum of their two targets as the published estimate.
//!
//! The estimator and the pacer that must react to its output live in the
//! same interceptor chain but never hold a reference to each other: the
//! estimator publishes through a [`TargetBitrateHandle`], and the pacer
//! reads it independently. This keeps the chain acyclic.
//!
//! The pacer and the encoder's bitrate-controller interface want different
//! things from the same estimate: the pacer must react to every update so
//! its send rate tracks the network, while the encoder should only
//! reconfigure when the estimate has moved enough to be worth the
//! disruption. [`TargetBitrateHandle`] is therefore updated unconditionally
//! on every combined update, and [`EncoderBitrateHandle`] is a separate,
//! hysteresis-gated mirror of the same value for the encoder side.

use super::delay_controller::DelayController;
use super::feedback_adapter::{FeedbackAdapter, DEFAULT_HISTORY_CAPACITY};
use super::loss_controller::LossController;
use crate::frametype::FrameTagHandle;
use crate::stream_info::StreamInfo;
use crate::twcc::stream_supports_twcc;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::transport_feedbacks::cc_feedback_report::CcFeedbackReport;
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use shared::error::Error;
use shared::marshal::Unmarshal;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A cloneable handle to the estimator's latest published target bitrate, in
/// bits per second.
///
/// Created once by the application and handed both to
/// [`BandwidthEstimatorBuilder`] and to a pacer builder, so the two
/// interceptors can be composed into the same chain without either one
/// holding a reference to the other.
#[derive(Clone)]
pub struct TargetBitrateHandle(Arc<AtomicI64>);

impl TargetBitrateHandle {
    pub fn new(initial_bitrate: i64) -> Self {
        Self(Arc::new(AtomicI64::new(initial_bitrate)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// A cloneable handle publishing the estimator's current round-trip time and
/// loss ratio, for consumers (such as the FlexFEC protection calculator)
/// that need network conditions but shouldn't hold a reference to the
/// estimator itself.
#[derive(Clone)]
pub struct CongestionStatsHandle(Arc<Mutex<(Duration, f32, &'static str)>>);

impl CongestionStatsHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new((Duration::ZERO, 0.0, "hold"))))
    }

    /// Round-trip time, loss ratio, and the delay controller's current
    /// hold/increase/decrease state as a lowercase label.
    pub fn get(&self) -> (Duration, f32, &'static str) {
        *self.0.lock().unwrap()
    }

    fn set(&self, rtt: Duration, loss_ratio: f32, state: &'static str) {
        *self.0.lock().unwrap() = (rtt, loss_ratio, state);
    }
}

impl Default for CongestionStatsHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A cloneable, hysteresis-gated mirror of the combined target bitrate,
/// meant for the encoder's bitrate-controller interface. Unlike
/// [`TargetBitrateHandle`], this only changes when the estimate moves by at
/// least the builder's configured hysteresis fraction, so the encoder isn't
/// asked to reconfigure on every small fluctuation.
#[derive(Clone)]
pub struct EncoderBitrateHandle(Arc<AtomicI64>);

impl EncoderBitrateHandle {
    pub fn new(initial_bitrate: i64) -> Self {
        Self(Arc::new(AtomicI64::new(initial_bitrate)))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Builder for the combined bandwidth estimator interceptor.
pub struct BandwidthEstimatorBuilder<P> {
    handle: TargetBitrateHandle,
    stats_handle: Option<CongestionStatsHandle>,
    encoder_handle: Option<EncoderBitrateHandle>,
    frame_tags: Option<FrameTagHandle>,
    min_bitrate: i64,
    max_bitrate: i64,
    initial_bitrate: i64,
    history_capacity: usize,
    hysteresis: f64,
    _phantom: PhantomData<P>,
}

impl<P> BandwidthEstimatorBuilder<P> {
    /// Create a new builder publishing the pacer-facing target into `handle`.
    pub fn new(handle: TargetBitrateHandle) -> Self {
        Self {
            handle,
            stats_handle: None,
            encoder_handle: None,
            frame_tags: None,
            min_bitrate: 50_000,
            max_bitrate: 50_000_000,
            initial_bitrate: 1_000_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            hysteresis: 0.15,
            _phantom: PhantomData,
        }
    }

    /// Also publish round-trip time and loss ratio through `handle`, for
    /// consumers like the FlexFEC protection calculator.
    pub fn with_congestion_stats_handle(mut self, handle: CongestionStatsHandle) -> Self {
        self.stats_handle = Some(handle);
        self
    }

    /// Also publish the hysteresis-gated target into `handle`, for the
    /// encoder's bitrate-controller interface.
    pub fn with_encoder_bitrate_handle(mut self, handle: EncoderBitrateHandle) -> Self {
        self.encoder_handle = Some(handle);
        self
    }

    /// Correlate outgoing Acks with the frame-type tagger's classification
    /// of the same packet, so each [`super::acknowledgment::Acknowledgment`]
    /// carries a frame id for diagnostics.
    pub fn with_frame_tag_handle(mut self, handle: FrameTagHandle) -> Self {
        self.frame_tags = Some(handle);
        self
    }

    pub fn with_min_bitrate(mut self, bps: i64) -> Self {
        self.min_bitrate = bps;
        self
    }

    pub fn with_max_bitrate(mut self, bps: i64) -> Self {
        self.max_bitrate = bps;
        self
    }

    pub fn with_initial_bitrate(mut self, bps: i64) -> Self {
        self.initial_bitrate = bps;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Fraction the target must move by before a change is published.
    pub fn with_hysteresis(mut self, fraction: f64) -> Self {
        self.hysteresis = fraction;
        self
    }

    pub fn build(self) -> impl FnOnce(P) -> BandwidthEstimatorInterceptor<P> {
        move |inner| BandwidthEstimatorInterceptor {
            inner,
            handle: self.handle,
            stats_handle: self.stats_handle,
            encoder_handle: self.encoder_handle,
            frame_tags: self.frame_tags,
            feedback_adapter: FeedbackAdapter::new(self.history_capacity),
            delay_controller: DelayController::new(self.initial_bitrate, self.min_bitrate, self.max_bitrate),
            loss_controller: LossController::new(self.initial_bitrate, self.min_bitrate, self.max_bitrate),
            hysteresis: self.hysteresis,
            streams: HashMap::new(),
        }
    }
}

struct LocalStream {
    hdr_ext_id: u8,
}

/// Interceptor that observes outbound packet departures and inbound
/// congestion-control feedback, and publishes a target bitrate through a
/// shared [`TargetBitrateHandle`].
pub struct BandwidthEstimatorInterceptor<P> {
    inner: P,
    handle: TargetBitrateHandle,
    stats_handle: Option<CongestionStatsHandle>,
    encoder_handle: Option<EncoderBitrateHandle>,
    frame_tags: Option<FrameTagHandle>,
    feedback_adapter: FeedbackAdapter,
    delay_controller: DelayController,
    loss_controller: LossController,
    hysteresis: f64,
    streams: HashMap<u32, LocalStream>,
}

impl<P> BandwidthEstimatorInterceptor<P> {
    fn process_feedback(&mut self, now: Instant, acks: Vec<super::acknowledgment::Acknowledgment>) {
        if acks.is_empty() {
            return;
        }

        if let Some(rtt) = acks
            .iter()
            .filter(|a| a.arrival.is_some())
            .map(|a| now.duration_since(a.departure))
            .min()
        {
            self.delay_controller.update_rtt(rtt);
        }

        let delay_stats = self.delay_controller.update(now, &acks);
        let loss_stats = self.loss_controller.update(&acks);
        let combined = delay_stats.target_bitrate.min(loss_stats.target_bitrate);

        // The pacer must track every update to keep its send rate close to
        // the network; it is never hysteresis-gated.
        self.handle.set(combined);

        if let Some(encoder_handle) = &self.encoder_handle {
            let current = encoder_handle.get();
            if current == 0 || (combined - current).abs() as f64 >= self.hysteresis * current as f64 {
                encoder_handle.set(combined);
            }
        }

        if let Some(stats_handle) = &self.stats_handle {
            let state = match delay_stats.state {
                super::delay_controller::ControllerState::Hold => "hold",
                super::delay_controller::ControllerState::Increase => "increase",
                super::delay_controller::ControllerState::Decrease => "decrease",
            };
            stats_handle.set(self.delay_controller.rtt(), loss_stats.loss_ratio as f32, state);
        }
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()> for BandwidthEstimatorInterceptor<P> {
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtcp(ref pkts) = msg.message {
            for pkt in pkts {
                if let Some(fb) = pkt.as_any().downcast_ref::<TransportLayerCc>() {
                    let acks = self.feedback_adapter.on_transport_cc_feedback(msg.now, fb);
                    self.process_feedback(msg.now, acks);
                } else if let Some(fb) = pkt.as_any().downcast_ref::<CcFeedbackReport>() {
                    let acks = self.feedback_adapter.on_rfc8888_feedback(msg.now, fb);
                    self.process_feedback(msg.now, acks);
                }
            }
        }
        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtp(ref rtp_packet) = msg.message {
            let ssrc = rtp_packet.header.ssrc;
            let twcc_seq = self.streams.get(&ssrc).and_then(|stream| {
                rtp_packet
                    .header
                    .get_extension(stream.hdr_ext_id)
                    .and_then(|data| {
                        rtp::extension::transport_cc_extension::TransportCcExtension::unmarshal(
                            &mut data.as_ref(),
                        )
                        .ok()
                        .map(|ext| ext.transport_sequence)
                    })
            });
            let size = rtp_packet.payload.len() + rtp_packet.header.marshal_size();
            let frame_id = self
                .frame_tags
                .as_ref()
                .and_then(|tags| tags.get(ssrc, rtp_packet.header.sequence_number))
                .map(|tag| tag.frame_id);
            self.feedback_adapter.on_sent(
                msg.now,
                ssrc,
                rtp_packet.header.sequence_number,
                twcc_seq,
                size,
                frame_id,
            );
        }
        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.inner.poll_write()
    }

    fn handle_event(&mut self, evt: ()) -> Result<(), Self::Error> {
        self.inner.handle_event(evt)
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.inner.poll_event()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.inner.poll_timeout()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for BandwidthEstimatorInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        if let Some(hdr_ext_id) = stream_supports_twcc(info)
            && hdr_ext_id != 0
        {
            self.streams.insert(info.ssrc, LocalStream { hdr_ext_id });
        }
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.streams.remove(&info.ssrc);
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use crate::stream_info::RTPHeaderExtension;
    use rtcp::transport_feedbacks::transport_layer_cc::{PacketStatusChunk, SymbolStatus};
    use sansio::Protocol;
    use std::time::Duration;

    fn make_rtp_packet(ssrc: u32, seq: u16) -> TaggedPacket {
        TaggedPacket {
            now: Instant::now(),
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet {
                header: rtp::header::Header {
                    ssrc,
                    sequence_number: seq,
                    ..Default::default()
                },
                payload: vec![0u8; 100].into(),
            }),
        }
    }

    #[test]
    fn builder_defaults_publish_initial_bitrate() {
        let handle = TargetBitrateHandle::new(1_000_000);
        let chain = Registry::new()
            .with(BandwidthEstimatorBuilder::new(handle.clone()).build())
            .build();

        assert_eq!(handle.get(), 1_000_000);
        assert!(chain.streams.is_empty());
    }

    #[test]
    fn frame_tag_handle_does_not_disrupt_the_write_path() {
        use crate::frametype::{FrameTagHandle, FrameTypeTaggerBuilder};

        let handle = TargetBitrateHandle::new(1_000_000);
        let tags = FrameTagHandle::new();
        let mut chain = Registry::new()
            .with(
                BandwidthEstimatorBuilder::new(handle.clone())
                    .with_frame_tag_handle(tags.clone())
                    .build(),
            )
            .with(FrameTypeTaggerBuilder::new(tags.clone()).build())
            .build();

        let mut pkt = make_rtp_packet(42, 0);
        // FU-A start, type 5 (IDR), so the tagger records a key frame.
        pkt.message = Packet::Rtp(rtp::Packet {
            header: rtp::header::Header {
                ssrc: 42,
                sequence_number: 0,
                ..Default::default()
            },
            payload: vec![0x1C, 0b1000_0101].into(),
        });
        chain.handle_write(pkt).unwrap();

        assert_eq!(tags.get(42, 0).unwrap().frame_id, 0);
    }

    #[test]
    fn feedback_updates_published_target_bitrate() {
        let handle = TargetBitrateHandle::new(1_000_000);
        let mut chain = Registry::new()
            .with(
                BandwidthEstimatorBuilder::new(handle.clone())
                    .with_hysteresis(0.0)
                    .build(),
            )
            .build();

        let info = StreamInfo {
            ssrc: 42,
            rtp_header_extensions: vec![RTPHeaderExtension {
                uri: crate::twcc::TRANSPORT_CC_URI.to_string(),
                id: 5,
            }],
            ..Default::default()
        };
        chain.bind_local_stream(&info);

        let now = Instant::now();
        for seq in 0u16..10 {
            let mut pkt = make_rtp_packet(42, seq);
            pkt.now = now;
            // Simulate the TWCC sender having already assigned sequence `seq`
            // to this packet's header extension.
            if let Packet::Rtp(ref mut rtp_packet) = pkt.message {
                let ext = rtp::extension::transport_cc_extension::TransportCcExtension {
                    transport_sequence: seq,
                };
                use shared::marshal::Marshal;
                let data = ext.marshal().unwrap();
                rtp_packet.header.set_extension(5, data.freeze()).unwrap();
            }
            chain.handle_write(pkt).unwrap();
            chain.poll_write();
        }

        let fb = TaggedPacket {
            now: now + Duration::from_millis(50),
            transport: Default::default(),
            message: Packet::Rtcp(vec![Box::new(TransportLayerCc {
                sender_ssrc: 1,
                media_ssrc: 42,
                base_sequence_number: 0,
                packet_status_count: 10,
                reference_time: 1,
                fb_pkt_count: 0,
                packet_chunks: vec![PacketStatusChunk::RunLength {
                    symbol: SymbolStatus::SmallDelta,
                    run_length: 10,
                }],
                recv_deltas: vec![40; 10],
            })]),
        };
        chain.handle_read(fb).unwrap();

        // Low loss, stable delay: the estimate should move, not stay frozen.
        assert!(handle.get() > 0);
    }

    /// Drives one TWCC feedback round through a chain built with the given
    /// hysteresis fraction, returning the pacer-facing and encoder-facing
    /// handles after the update.
    fn run_one_feedback_round(hysteresis: f64) -> (TargetBitrateHandle, EncoderBitrateHandle) {
        let handle = TargetBitrateHandle::new(1_000_000);
        let encoder_handle = EncoderBitrateHandle::new(1_000_000);
        let mut chain = Registry::new()
            .with(
                BandwidthEstimatorBuilder::new(handle.clone())
                    .with_encoder_bitrate_handle(encoder_handle.clone())
                    .with_hysteresis(hysteresis)
                    .build(),
            )
            .build();

        let info = StreamInfo {
            ssrc: 42,
            rtp_header_extensions: vec![RTPHeaderExtension {
                uri: crate::twcc::TRANSPORT_CC_URI.to_string(),
                id: 5,
            }],
            ..Default::default()
        };
        chain.bind_local_stream(&info);

        let now = Instant::now();
        for seq in 0u16..10 {
            let mut pkt = make_rtp_packet(42, seq);
            pkt.now = now;
            if let Packet::Rtp(ref mut rtp_packet) = pkt.message {
                let ext = rtp::extension::transport_cc_extension::TransportCcExtension {
                    transport_sequence: seq,
                };
                use shared::marshal::Marshal;
                let data = ext.marshal().unwrap();
                rtp_packet.header.set_extension(5, data.freeze()).unwrap();
            }
            chain.handle_write(pkt).unwrap();
            chain.poll_write();
        }

        let fb = TaggedPacket {
            now: now + Duration::from_millis(50),
            transport: Default::default(),
            message: Packet::Rtcp(vec![Box::new(TransportLayerCc {
                sender_ssrc: 1,
                media_ssrc: 42,
                base_sequence_number: 0,
                packet_status_count: 10,
                reference_time: 1,
                fb_pkt_count: 0,
                packet_chunks: vec![PacketStatusChunk::RunLength {
                    symbol: SymbolStatus::SmallDelta,
                    run_length: 10,
                }],
                recv_deltas: vec![40; 10],
            })]),
        };
        chain.handle_read(fb).unwrap();

        (handle, encoder_handle)
    }

    #[test]
    fn zero_hysteresis_keeps_encoder_handle_in_lockstep_with_pacer_handle() {
        let (handle, encoder_handle) = run_one_feedback_round(0.0);
        assert_eq!(handle.get(), encoder_handle.get());
    }

    #[test]
    fn large_hysteresis_gates_encoder_handle_without_affecting_pacer_handle() {
        // A hysteresis fraction this large can never be cleared by any
        // target bitrate the clamped estimators can produce, so the
        // encoder-facing handle must stay at its initial value.
        let (handle, encoder_handle) = run_one_feedback_round(1_000.0);
        assert_eq!(encoder_handle.get(), 1_000_000);

        // The pacer-facing handle is never gated, so the hysteresis
        // fraction has no effect on it: it lands on the same value whether
        // the encoder's gate is open or effectively closed.
        let (ungated_handle, _) = run_one_feedback_round(0.0);
        assert_eq!(handle.get(), ungated_handle.get());
    }
}
