//! Generic NACK feedback (RFC 4585 section 6.2.1), PT=205 FMT=1.

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};
use std::any::Any;

use crate::header::{Header, PacketType, FMT_NACK};
use crate::packet::Packet;

/// A base sequence number (`packet_id`) plus a 16-bit bitmask of the following
/// 16 sequence numbers that were also lost (`lost_packets`, a.k.a. BLP).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NackPair {
    pub packet_id: u16,
    pub lost_packets: u16,
}

impl NackPair {
    /// Invoke `f` once for every sequence number this pair covers: first the
    /// base `packet_id`, then one for each set bit in `lost_packets`.
    pub fn range(&self, mut f: impl FnMut(u16)) {
        f(self.packet_id);
        for i in 0..16u16 {
            if self.lost_packets & (1 << i) != 0 {
                f(self.packet_id.wrapping_add(i + 1));
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLayerNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    pub(crate) fn unmarshal_body(raw: &mut impl Buf, _header: &Header) -> Result<Self> {
        if raw.remaining() < 8 {
            return Err(Error::PacketTooShort);
        }
        let sender_ssrc = raw.get_u32();
        let media_ssrc = raw.get_u32();

        let mut nacks = Vec::new();
        while raw.remaining() >= 4 {
            nacks.push(NackPair {
                packet_id: raw.get_u16(),
                lost_packets: raw.get_u16(),
            });
        }

        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}

impl Marshal for TransportLayerNack {
    fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + 8 + self.nacks.len() * 4
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        let header = Header {
            padding: false,
            count: FMT_NACK,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (body_len / 4 - 1) as u16,
        };
        header.marshal_to(buf)?;

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for nack in &self.nacks {
            buf.put_u16(nack.packet_id);
            buf.put_u16(nack.lost_packets);
        }

        Ok(buf.len() - start)
    }
}

impl Packet for TransportLayerNack {
    fn header(&self) -> Header {
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        Header {
            padding: false,
            count: FMT_NACK,
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
            .downcast_ref::<TransportLayerNack>()
            .is_some_and(|o| o == self)
    }
}

/// Pack a set of lost sequence numbers into the minimal number of NACK pairs.
pub fn nack_pairs_from_sequence_numbers(seq_numbers: &[u16]) -> Vec<NackPair> {
    let mut sorted = seq_numbers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut pairs = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let base = sorted[i];
        let mut blp = 0u16;
        let mut j = i + 1;
        while j < sorted.len() {
            let diff = sorted[j].wrapping_sub(base);
            if diff == 0 || diff > 16 {
                break;
            }
            blp |= 1 << (diff - 1);
            j += 1;
        }
        pairs.push(NackPair {
            packet_id: base,
            lost_packets: blp,
        });
        i = j;
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let nack = TransportLayerNack {
            sender_ssrc: 1,
            media_ssrc: 2,
            nacks: vec![NackPair {
                packet_id: 11,
                lost_packets: 0b1011,
            }],
        };

        let marshalled = nack.marshal().unwrap();
        let mut body = marshalled.clone().freeze();
        let header = Header::unmarshal(&mut body).unwrap();
        let parsed = TransportLayerNack::unmarshal_body(&mut body, &header).unwrap();
        assert_eq!(nack, parsed);
    }

    #[test]
    fn range_expands_bitmask() {
        let pair = NackPair {
            packet_id: 11,
            lost_packets: 0b1011,
        };
        let mut seqs = Vec::new();
        pair.range(|s| seqs.push(s));
        assert_eq!(seqs, vec![11, 12, 13, 15]);
    }

    #[test]
    fn packs_contiguous_losses_into_one_pair() {
        let pairs = nack_pairs_from_sequence_numbers(&[10, 11, 12, 30]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].packet_id, 10);
        assert_eq!(pairs[0].lost_packets, 0b11);
    }
}
