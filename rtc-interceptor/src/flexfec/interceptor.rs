//! Ties the protection-group accumulator, adaptive protection calculator,
//! and FlexFEC encoder together into an outbound interceptor.

use super::encoder::{FlexFecEncoder03, ProtectedPacket};
use super::protection::{CodecParams, NetworkStats, ProtectionCalculator};
use crate::frametype::{FrameTagHandle, FrameType};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::Error;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const DEFAULT_MIN_MEDIA_PACKETS: usize = 3;
const DEFAULT_FEC_PAYLOAD_TYPE: u8 = 118;

/// Shared network/codec stats feeding the protection calculator, published
/// by whoever wires the congestion-control side of the chain together. The
/// FEC encoder never reaches back into the bandwidth estimator directly.
#[derive(Clone)]
pub struct FecStatsHandle {
    inner: Arc<Mutex<(NetworkStats, CodecParams)>>,
}

impl FecStatsHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new((
                NetworkStats {
                    frame_rate: 30.0,
                    ..Default::default()
                },
                CodecParams::default(),
            ))),
        }
    }

    pub fn set_network_stats(&self, stats: NetworkStats) {
        self.inner.lock().unwrap().0 = stats;
    }

    pub fn set_codec_params(&self, codec: CodecParams) {
        self.inner.lock().unwrap().1 = codec;
    }

    fn get(&self) -> (NetworkStats, CodecParams) {
        *self.inner.lock().unwrap()
    }
}

impl Default for FecStatsHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FecEncoderBuilder<P> {
    stats: FecStatsHandle,
    frame_tags: FrameTagHandle,
    min_media_packets: usize,
    fec_payload_type: u8,
    fec_ssrc: Option<u32>,
    _phantom: PhantomData<P>,
}

impl<P> FecEncoderBuilder<P> {
    pub fn new(stats: FecStatsHandle, frame_tags: FrameTagHandle) -> Self {
        Self {
            stats,
            frame_tags,
            min_media_packets: DEFAULT_MIN_MEDIA_PACKETS,
            fec_payload_type: DEFAULT_FEC_PAYLOAD_TYPE,
            fec_ssrc: None,
            _phantom: PhantomData,
        }
    }

    pub fn with_min_media_packets(mut self, count: usize) -> Self {
        self.min_media_packets = count;
        self
    }

    pub fn with_fec_payload_type(mut self, pt: u8) -> Self {
        self.fec_payload_type = pt;
        self
    }

    pub fn with_fec_ssrc(mut self, ssrc: u32) -> Self {
        self.fec_ssrc = Some(ssrc);
        self
    }

    pub fn build(self) -> impl FnOnce(P) -> FecEncoderInterceptor<P> {
        move |inner| FecEncoderInterceptor {
            inner,
            stats: self.stats,
            frame_tags: self.frame_tags,
            calculator: ProtectionCalculator::new(),
            encoder: None,
            fec_payload_type: self.fec_payload_type,
            fec_ssrc: self.fec_ssrc,
            min_media_packets: self.min_media_packets,
            group: Vec::new(),
            group_ssrc: None,
        }
    }
}

pub struct FecEncoderInterceptor<P> {
    inner: P,

    stats: FecStatsHandle,
    frame_tags: FrameTagHandle,
    calculator: ProtectionCalculator,
    encoder: Option<FlexFecEncoder03>,

    fec_payload_type: u8,
    fec_ssrc: Option<u32>,
    min_media_packets: usize,

    group: Vec<ProtectedPacket>,
    group_ssrc: Option<u32>,
}

impl<P: Interceptor> FecEncoderInterceptor<P> {
    fn emit_group(
        &mut self,
        now: Instant,
        transport: &shared::TransportContext,
    ) -> Result<(), Error> {
        if self.group.len() < self.min_media_packets {
            return Ok(());
        }
        let Some(encoder) = self.encoder.as_mut() else {
            self.group.clear();
            self.group_ssrc = None;
            return Ok(());
        };

        let (stats, codec) = self.stats.get();
        self.calculator.update_network_stats(stats);
        self.calculator.update_codec_params(codec);
        let params = self.calculator.protection_params();

        let ssrc = self.group_ssrc.unwrap_or(0);
        let mut key_count = 0usize;
        for pkt in &self.group {
            if let Some(tag) = self.frame_tags.get(ssrc, pkt.sequence_number)
                && tag.frame_type == FrameType::KeyFrame
            {
                key_count += 1;
            }
        }
        let key_ratio = key_count as f32 / self.group.len() as f32;
        let factor = params.protection_factor_delta as f32
            + (params.protection_factor_key as f32 - params.protection_factor_delta as f32) * key_ratio;
        let factor = factor.round().clamp(0.0, 255.0) as u8;

        let fec_count = ProtectionCalculator::fec_count(factor, self.group.len());
        if fec_count > 0 {
            for (seq, fec_ssrc, payload) in encoder.encode(&self.group, fec_count) {
                let header = rtp::header::Header {
                    payload_type: encoder.payload_type(),
                    sequence_number: seq,
                    timestamp: self.group.last().map(|p| p.timestamp).unwrap_or(0),
                    ssrc: fec_ssrc,
                    ..Default::default()
                };
                self.inner.handle_write(TaggedPacket {
                    now,
                    transport: transport.clone(),
                    message: Packet::Rtp(rtp::Packet { header, payload }),
                })?;
            }
        }

        self.group.clear();
        self.group_ssrc = None;
        Ok(())
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()> for FecEncoderInterceptor<P> {
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtp(rtp_packet) = &msg.message {
            let marker = rtp_packet.header.marker;
            self.group_ssrc.get_or_insert(rtp_packet.header.ssrc);
            self.group.push(ProtectedPacket {
                sequence_number: rtp_packet.header.sequence_number,
                timestamp: rtp_packet.header.timestamp,
                marker,
                payload_type: rtp_packet.header.payload_type,
                payload: rtp_packet.payload.clone(),
            });

            let now = msg.now;
            let transport = msg.transport.clone();
            self.inner.handle_write(msg)?;

            // The short mask can cover at most 15 packets; force an
            // emission rather than let the group outgrow it.
            if marker || self.group.len() >= 15 {
                self.emit_group(now, &transport)?;
            }
            Ok(())
        } else {
            self.inner.handle_write(msg)
        }
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
        self.group.clear();
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for FecEncoderInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        let fec_ssrc = self.fec_ssrc.or(info.ssrc_fec).unwrap_or(info.ssrc ^ 0xFEC);
        let fec_pt = info.payload_type_fec.unwrap_or(self.fec_payload_type);
        self.encoder = Some(FlexFecEncoder03::new(fec_pt, fec_ssrc, info.ssrc));
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.encoder = None;
        self.group.clear();
        self.group_ssrc = None;
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }
}
