//! Transport-wide congestion control feedback, as specified by
//! draft-holmer-rmcat-transport-wide-cc-extensions-01. PT=205, FMT=15.

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};
use std::any::Any;

use crate::header::{Header, PacketType, FMT_TWCC};
use crate::packet::Packet;

const TCC_HEADER_SIZE: usize = 8 + 2 + 2 + 3 + 1;

/// Per-packet receive status, as encoded in a packet chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStatus {
    NotReceived,
    SmallDelta,
    LargeDelta,
}

impl SymbolStatus {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => SymbolStatus::NotReceived,
            1 => SymbolStatus::SmallDelta,
            _ => SymbolStatus::LargeDelta,
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            SymbolStatus::NotReceived => 0,
            SymbolStatus::SmallDelta => 1,
            SymbolStatus::LargeDelta => 2,
        }
    }
}

/// One packet-status chunk: either a run of identical statuses, or a vector
/// of individually-encoded ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    RunLength {
        symbol: SymbolStatus,
        run_length: u16,
    },
    StatusVector {
        two_bit: bool,
        symbols: Vec<SymbolStatus>,
    },
}

impl PacketStatusChunk {
    fn unmarshal(raw: &mut impl Buf) -> Result<Self> {
        if raw.remaining() < 2 {
            return Err(Error::PacketTooShort);
        }
        let word = raw.get_u16();
        let is_vector = (word >> 15) & 0x1 != 0;
        if !is_vector {
            let symbol = SymbolStatus::from_bits(((word >> 13) & 0x3) as u8);
            let run_length = word & 0x1FFF;
            Ok(PacketStatusChunk::RunLength { symbol, run_length })
        } else {
            let two_bit = (word >> 14) & 0x1 != 0;
            let bits = word & 0x3FFF;
            let symbols = if two_bit {
                (0..7)
                    .map(|i| SymbolStatus::from_bits(((bits >> (12 - i * 2)) & 0x3) as u8))
                    .collect()
            } else {
                (0..14)
                    .map(|i| SymbolStatus::from_bits(((bits >> (13 - i)) & 0x1) as u8))
                    .collect()
            };
            Ok(PacketStatusChunk::StatusVector { two_bit, symbols })
        }
    }

    fn marshal_to(&self, buf: &mut BytesMut) {
        let word: u16 = match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                ((symbol.to_bits() as u16) << 13) | (run_length & 0x1FFF)
            }
            PacketStatusChunk::StatusVector { two_bit, symbols } => {
                let mut bits: u16 = 1 << 15;
                if *two_bit {
                    bits |= 1 << 14;
                    for (i, s) in symbols.iter().take(7).enumerate() {
                        bits |= (s.to_bits() as u16) << (12 - i * 2);
                    }
                } else {
                    for (i, s) in symbols.iter().take(14).enumerate() {
                        bits |= (s.to_bits() as u16) << (13 - i);
                    }
                }
                bits
            }
        };
        buf.put_u16(word);
    }

    fn expand(&self) -> Vec<SymbolStatus> {
        match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                vec![*symbol; *run_length as usize]
            }
            PacketStatusChunk::StatusVector { symbols, .. } => symbols.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLayerCc {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// 24-bit reference time, in units of 64ms.
    pub reference_time: u32,
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    /// One entry per received packet, units of 250us; `SmallDelta` packs into
    /// a single unsigned byte on the wire, `LargeDelta` into a signed i16.
    pub recv_deltas: Vec<i16>,
}

impl TransportLayerCc {
    pub(crate) fn unmarshal_body(raw: &mut impl Buf, _header: &Header) -> Result<Self> {
        if raw.remaining() < TCC_HEADER_SIZE {
            return Err(Error::PacketTooShort);
        }
        let sender_ssrc = raw.get_u32();
        let media_ssrc = raw.get_u32();
        let base_sequence_number = raw.get_u16();
        let packet_status_count = raw.get_u16();
        let reference_time = raw.get_uint(3) as u32;
        let fb_pkt_count = raw.get_u8();

        let mut packet_chunks = Vec::new();
        let mut seen = 0u32;
        while seen < packet_status_count as u32 {
            let chunk = PacketStatusChunk::unmarshal(raw)?;
            seen += chunk.expand().len() as u32;
            packet_chunks.push(chunk);
        }

        let statuses: Vec<SymbolStatus> = packet_chunks
            .iter()
            .flat_map(PacketStatusChunk::expand)
            .take(packet_status_count as usize)
            .collect();

        let mut recv_deltas = Vec::new();
        for status in &statuses {
            match status {
                SymbolStatus::SmallDelta => {
                    if raw.remaining() < 1 {
                        return Err(Error::PacketTooShort);
                    }
                    recv_deltas.push(raw.get_u8() as i16);
                }
                SymbolStatus::LargeDelta => {
                    if raw.remaining() < 2 {
                        return Err(Error::PacketTooShort);
                    }
                    recv_deltas.push(raw.get_i16());
                }
                SymbolStatus::NotReceived => {}
            }
        }

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }

    /// Expand the packet chunks into one status per packet covered by this
    /// feedback report.
    pub fn statuses(&self) -> Vec<SymbolStatus> {
        self.packet_chunks
            .iter()
            .flat_map(PacketStatusChunk::expand)
            .take(self.packet_status_count as usize)
            .collect()
    }
}

impl Marshal for TransportLayerCc {
    fn marshal_size(&self) -> usize {
        let chunks_len = self.packet_chunks.len() * 2;
        let deltas_len: usize = self
            .statuses()
            .iter()
            .zip(self.recv_deltas.iter())
            .map(|(s, _)| if *s == SymbolStatus::LargeDelta { 2 } else { 1 })
            .sum();
        crate::header::HEADER_LENGTH + TCC_HEADER_SIZE + chunks_len + deltas_len
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        let header = Header {
            padding: false,
            count: FMT_TWCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (body_len / 4 - 1) as u16,
        };
        header.marshal_to(buf)?;

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_u16(self.base_sequence_number);
        buf.put_u16(self.packet_status_count);
        buf.put_uint(self.reference_time as u64, 3);
        buf.put_u8(self.fb_pkt_count);

        for chunk in &self.packet_chunks {
            chunk.marshal_to(buf);
        }

        let statuses = self.statuses();
        let mut deltas = self.recv_deltas.iter();
        for status in &statuses {
            match status {
                SymbolStatus::SmallDelta => {
                    if let Some(d) = deltas.next() {
                        buf.put_u8(*d as u8);
                    }
                }
                SymbolStatus::LargeDelta => {
                    if let Some(d) = deltas.next() {
                        buf.put_i16(*d);
                    }
                }
                SymbolStatus::NotReceived => {}
            }
        }

        Ok(buf.len() - start)
    }
}

impl Packet for TransportLayerCc {
    fn header(&self) -> Header {
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        Header {
            padding: false,
            count: FMT_TWCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (body_len / 4 - 1) as u16,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equal(&self, other: &dyn Packet) -> bool {
        other
            .as_any()
            .downcast_ref::<TransportLayerCc>()
            .is_some_and(|o| o == self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_run_length_chunk() {
        let tcc = TransportLayerCc {
            sender_ssrc: 1,
            media_ssrc: 2,
            base_sequence_number: 10,
            packet_status_count: 3,
            reference_time: 555,
            fb_pkt_count: 4,
            packet_chunks: vec![PacketStatusChunk::RunLength {
                symbol: SymbolStatus::SmallDelta,
                run_length: 3,
            }],
            recv_deltas: vec![4, 8, 12],
        };

        let marshalled = tcc.marshal().unwrap();
        let mut body = marshalled.clone().freeze();
        let header = Header::unmarshal(&mut body).unwrap();
        let parsed = TransportLayerCc::unmarshal_body(&mut body, &header).unwrap();
        assert_eq!(tcc, parsed);
    }

    #[test]
    fn round_trips_status_vector_chunk() {
        let tcc = TransportLayerCc {
            sender_ssrc: 1,
            media_ssrc: 2,
            base_sequence_number: 0,
            packet_status_count: 3,
            reference_time: 1,
            fb_pkt_count: 0,
            packet_chunks: vec![PacketStatusChunk::StatusVector {
                two_bit: false,
                symbols: vec![
                    SymbolStatus::SmallDelta,
                    SymbolStatus::NotReceived,
                    SymbolStatus::SmallDelta,
                ],
            }],
            recv_deltas: vec![1, 2],
        };

        let marshalled = tcc.marshal().unwrap();
        let mut body = marshalled.clone().freeze();
        let header = Header::unmarshal(&mut body).unwrap();
        let parsed = TransportLayerCc::unmarshal_body(&mut body, &header).unwrap();
        assert_eq!(tcc.statuses(), parsed.statuses());
        assert_eq!(tcc.recv_deltas, parsed.recv_deltas);
    }
}
