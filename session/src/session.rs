//! Wires the outbound interceptor chain and the inbound RTCP reader onto a
//! UDP socket for a single peer, in the composition order documented on
//! [`interceptor::cc::bwe`]: `NoOp, SenderReport, BandwidthEstimator, Fec,
//! Nack, Twcc, Pacer, FrameType` (innermost to outermost).

use crate::config::{Codec, CodecConfig};
use crate::diagnostics::Diagnostics;
use bytes::Bytes;
use interceptor::pacer::noop::{NoopPacerBuilder, NoopPacerInterceptor};
use interceptor::{
    BandwidthEstimatorBuilder, BandwidthEstimatorInterceptor, CongestionStatsHandle,
    FecEncoderBuilder, FecEncoderInterceptor, FecStatsHandle, FrameTagHandle,
    FrameTypeTaggerBuilder, FrameTypeTaggerInterceptor, Interceptor, LeakyBucketPacerBuilder,
    LeakyBucketPacerInterceptor, NackResponderBuilder, NackResponderInterceptor, NoopInterceptor,
    Packet, PacerStatsHandle, Registry, SenderReportBuilder, SenderReportInterceptor, StreamInfo,
    TaggedPacket, TargetBitrateHandle, TwccSenderBuilder, TwccSenderInterceptor,
};
use interceptor::flexfec::protection::{CodecParams, NetworkStats};
use interceptor::stream_info::{RTCPFeedback, RTPHeaderExtension};
use sansio::Protocol;
use shared::error::{Error, Result};
use shared::marshal::Marshal;
use shared::{TransportContext, TransportProtocol};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

const TWCC_HEADER_EXTENSION_ID: u16 = 5;

/// Whether outbound packets are shaped by the leaky-bucket pacer or sent
/// immediately. Selectable per session rather than hard-coded, since a
/// loopback or wired LAN session has no need for the bucket's scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    LeakyBucket,
    Disabled,
}

/// Dispatches between the two pacer implementations without forcing the
/// rest of the chain's type to be generic over which one is in use.
pub enum PacerStage<P> {
    LeakyBucket(LeakyBucketPacerInterceptor<P>),
    Disabled(NoopPacerInterceptor<P>),
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()> for PacerStage<P> {
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        match self {
            Self::LeakyBucket(p) => p.handle_read(msg),
            Self::Disabled(p) => p.handle_read(msg),
        }
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        match self {
            Self::LeakyBucket(p) => p.poll_read(),
            Self::Disabled(p) => p.poll_read(),
        }
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        match self {
            Self::LeakyBucket(p) => p.handle_write(msg),
            Self::Disabled(p) => p.handle_write(msg),
        }
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        match self {
            Self::LeakyBucket(p) => p.poll_write(),
            Self::Disabled(p) => p.poll_write(),
        }
    }

    fn handle_event(&mut self, evt: ()) -> Result<(), Self::Error> {
        match self {
            Self::LeakyBucket(p) => p.handle_event(evt),
            Self::Disabled(p) => p.handle_event(evt),
        }
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        match self {
            Self::LeakyBucket(p) => p.poll_event(),
            Self::Disabled(p) => p.poll_event(),
        }
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        match self {
            Self::LeakyBucket(p) => p.handle_timeout(now),
            Self::Disabled(p) => p.handle_timeout(now),
        }
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        match self {
            Self::LeakyBucket(p) => p.poll_timeout(),
            Self::Disabled(p) => p.poll_timeout(),
        }
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::LeakyBucket(p) => p.close(),
            Self::Disabled(p) => p.close(),
        }
    }
}

impl<P: Interceptor> Interceptor for PacerStage<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        match self {
            Self::LeakyBucket(p) => p.bind_local_stream(info),
            Self::Disabled(p) => p.bind_local_stream(info),
        }
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        match self {
            Self::LeakyBucket(p) => p.unbind_local_stream(info),
            Self::Disabled(p) => p.unbind_local_stream(info),
        }
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        match self {
            Self::LeakyBucket(p) => p.bind_remote_stream(info),
            Self::Disabled(p) => p.bind_remote_stream(info),
        }
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        match self {
            Self::LeakyBucket(p) => p.unbind_remote_stream(info),
            Self::Disabled(p) => p.unbind_remote_stream(info),
        }
    }
}

/// The fully composed outbound chain type. Spelled out once here so the
/// rest of this module (and the binary) can refer to `SessionChain` instead
/// of the eight-deep generic nest.
pub type SessionChain = FrameTypeTaggerInterceptor<
    PacerStage<
        TwccSenderInterceptor<
            NackResponderInterceptor<
                FecEncoderInterceptor<
                    BandwidthEstimatorInterceptor<SenderReportInterceptor<NoopInterceptor>>,
                >,
            >,
        >,
    >,
>;

/// Interval on which [`Session::tick`] bridges the bandwidth estimator's
/// latest RTT/loss readings into the FEC protection calculator's inputs.
const STATS_BRIDGE_INTERVAL: Duration = Duration::from_millis(500);

pub struct Session {
    chain: SessionChain,
    socket: UdpSocket,
    transport: TransportContext,

    target_bitrate: TargetBitrateHandle,
    congestion_stats: CongestionStatsHandle,
    fec_stats: FecStatsHandle,
    pacer_stats: PacerStatsHandle,

    local_ssrc: u32,
    next_sequence_number: u16,
    codec: CodecConfig,
    frame_tags: FrameTagHandle,

    diagnostics: Diagnostics,
    next_stats_bridge: Instant,
    started_at: Instant,

    recv_buf: Vec<u8>,
}

impl Session {
    /// Bind the interceptor chain to a freshly negotiated stream and start
    /// driving it over `socket`, which must already be connected (or at
    /// least addressed) to `peer_addr`.
    pub fn new(
        socket: UdpSocket,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        local_ssrc: u32,
        codec: CodecConfig,
        pacing_mode: PacingMode,
        diagnostics_dir: Option<&std::path::Path>,
    ) -> Result<Self> {
        socket.set_nonblocking(true)?;

        let target_bitrate = TargetBitrateHandle::new(codec.initial_bitrate);
        let congestion_stats = CongestionStatsHandle::new();
        let fec_stats = FecStatsHandle::new();
        let pacer_stats = PacerStatsHandle::new();
        let frame_tags = FrameTagHandle::new();
        let frame_tags_for_diagnostics = frame_tags.clone();

        let mut chain: SessionChain = Registry::new()
            .with(SenderReportBuilder::new().build())
            .with(
                BandwidthEstimatorBuilder::new(target_bitrate.clone())
                    .with_min_bitrate(codec.min_bitrate)
                    .with_max_bitrate(codec.max_bitrate)
                    .with_initial_bitrate(codec.initial_bitrate)
                    .with_congestion_stats_handle(congestion_stats.clone())
                    .with_frame_tag_handle(frame_tags.clone())
                    .build(),
            )
            .with(FecEncoderBuilder::new(fec_stats.clone(), frame_tags.clone()).build())
            .with(NackResponderBuilder::new().build())
            .with(TwccSenderBuilder::new().build())
            .with(|inner| match pacing_mode {
                PacingMode::LeakyBucket => PacerStage::LeakyBucket(
                    LeakyBucketPacerBuilder::new(target_bitrate.clone())
                        .with_stats_handle(pacer_stats.clone())
                        .build()(inner),
                ),
                PacingMode::Disabled => {
                    PacerStage::Disabled(NoopPacerBuilder::new().build()(inner))
                }
            })
            .with(FrameTypeTaggerBuilder::new(frame_tags).build())
            .build();

        let stream_info = StreamInfo {
            ssrc: local_ssrc,
            ssrc_rtx: Some(local_ssrc ^ 0x5258_5458),
            ssrc_fec: Some(local_ssrc ^ 0xFEC),
            payload_type: Codec::PAYLOAD_TYPE,
            payload_type_rtx: Some(Codec::RTX_PAYLOAD_TYPE),
            payload_type_fec: Some(Codec::FEC_PAYLOAD_TYPE),
            rtp_header_extensions: vec![RTPHeaderExtension {
                uri: interceptor::twcc::TRANSPORT_CC_URI.to_string(),
                id: TWCC_HEADER_EXTENSION_ID,
            }],
            mime_type: codec.codec.mime_type().to_string(),
            clock_rate: Codec::CLOCK_RATE,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![RTCPFeedback {
                typ: "nack".to_string(),
                parameter: String::new(),
            }],
        };
        chain.bind_local_stream(&stream_info);

        fec_stats.set_codec_params(CodecParams {
            width: 1280,
            height: 720,
        });

        let transport = TransportContext {
            local_addr,
            peer_addr,
            transport_protocol: TransportProtocol::UDP,
            ecn: None,
        };

        Ok(Self {
            chain,
            socket,
            transport,
            target_bitrate,
            congestion_stats,
            fec_stats,
            pacer_stats,
            local_ssrc,
            next_sequence_number: 0,
            codec,
            frame_tags: frame_tags_for_diagnostics,
            diagnostics: match diagnostics_dir {
                Some(dir) => Diagnostics::open(dir),
                None => Diagnostics::open(std::env::temp_dir()),
            },
            next_stats_bridge: Instant::now() + STATS_BRIDGE_INTERVAL,
            started_at: Instant::now(),
            recv_buf: vec![0u8; 2048],
        })
    }

    /// Milliseconds since this session started, for the diagnostic traces'
    /// `timestamp_ms` column.
    fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started_at).as_millis() as u64
    }

    /// Hand one encoder-produced payload to the outbound chain and flush
    /// whatever the chain is ready to send onto the socket. Called on the
    /// ingress worker's context; never blocks on network I/O.
    pub fn send_packet(&mut self, payload: Bytes, marker: bool, timestamp: u32) -> Result<()> {
        let now = Instant::now();
        let seq = self.next_sequence_number;
        let header = rtp::header::Header {
            payload_type: Codec::PAYLOAD_TYPE,
            sequence_number: seq,
            timestamp,
            ssrc: self.local_ssrc,
            marker,
            ..Default::default()
        };
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1);
        let payload_len = payload.len();

        self.chain.handle_write(TaggedPacket {
            now,
            transport: self.transport.clone(),
            message: Packet::Rtp(rtp::Packet { header, payload }),
        })?;

        if let Some(tag) = self.frame_tags.get(self.local_ssrc, seq) {
            let is_key_frame = tag.frame_type == interceptor::frametype::FrameType::KeyFrame;
            let timestamp_ms = self.elapsed_ms(now);
            self.diagnostics
                .record_frame_size(timestamp_ms, tag.frame_id, payload_len, is_key_frame);
        }

        self.flush_writes()
    }

    /// Drive the chain's periodic activities (sender reports, pacer ticks)
    /// and bridge the bandwidth estimator's congestion readings into the
    /// FEC protection calculator on [`STATS_BRIDGE_INTERVAL`].
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        self.chain.handle_timeout(now)?;
        self.flush_writes()?;

        let (budget_bytes, queue_len) = self.pacer_stats.get();
        let timestamp_ms = self.elapsed_ms(now);
        self.diagnostics.record_pacer(timestamp_ms, budget_bytes, queue_len);

        if now >= self.next_stats_bridge {
            self.next_stats_bridge = now + STATS_BRIDGE_INTERVAL;
            let (rtt, loss_ratio, delay_state) = self.congestion_stats.get();
            let target_bitrate = self.target_bitrate.get();
            self.fec_stats.set_network_stats(NetworkStats {
                rtt,
                loss_ratio,
                available_bitrate_bps: target_bitrate.clamp(0, u32::MAX as i64) as u32,
                frame_rate: self.codec.frame_rate,
            });

            self.diagnostics
                .record_gcc(timestamp_ms, target_bitrate, delay_state, loss_ratio as f64);
            self.diagnostics.record_rfc8888(
                timestamp_ms,
                self.local_ssrc,
                rtt.as_millis() as u64,
                loss_ratio as f64,
            );
        }
        Ok(())
    }

    /// Parse and dispatch one inbound RTCP datagram. Runs on the RTCP
    /// reader's own context, independent of the ingress worker.
    pub fn on_rtcp_datagram(&mut self, now: Instant, data: &[u8]) -> Result<()> {
        let packets = match rtcp::packet::unmarshal(&mut Bytes::copy_from_slice(data)) {
            Ok(packets) => packets,
            Err(e) => {
                log::warn!("rtcp: dropping malformed compound packet: {e}");
                return Ok(());
            }
        };
        self.chain.handle_read(TaggedPacket {
            now,
            transport: self.transport.clone(),
            message: Packet::Rtcp(packets),
        })?;
        // Nothing downstream of the chain consumes the read side; drain it
        // so the innermost queue doesn't grow unbounded.
        while self.chain.poll_read().is_some() {}
        self.flush_writes()
    }

    /// Non-blocking poll of the socket for one inbound RTCP datagram.
    /// Returns `Ok(false)` when nothing was available.
    pub fn poll_rtcp_socket(&mut self) -> Result<bool> {
        match self.socket.recv(&mut self.recv_buf) {
            Ok(n) => {
                let now = Instant::now();
                let data = self.recv_buf[..n].to_vec();
                self.on_rtcp_datagram(now, &data)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn flush_writes(&mut self) -> Result<()> {
        while let Some(out) = self.chain.poll_write() {
            let Packet::Rtp(packet) = out.message else {
                continue;
            };
            let bytes = packet.marshal()?;
            if let Err(e) = self.socket.send(&bytes) {
                log::warn!("udp write failed: {e}");
            }
        }
        Ok(())
    }

    /// When the chain next wants [`Session::tick`] called, the earlier of
    /// its own `poll_timeout` and the next stats-bridge deadline. The main
    /// loop should sleep no longer than this before calling `tick` again.
    pub fn poll_timeout(&mut self) -> Option<Instant> {
        let chain_deadline = self.chain.poll_timeout();
        match chain_deadline {
            Some(d) if d < self.next_stats_bridge => Some(d),
            Some(_) => Some(self.next_stats_bridge),
            None => Some(self.next_stats_bridge),
        }
    }

    pub fn target_bitrate(&self) -> &TargetBitrateHandle {
        &self.target_bitrate
    }

    pub fn close(&mut self) -> Result<()> {
        self.chain.close()
    }
}
