//! FlexFEC draft-03 repair packet construction.
//!
//! A repair packet XOR-combines the payload and selected header fields of a
//! contiguous run of media packets ("protection group") covered by a single
//! bitmask. Only the short (15-bit), single-SSRC mask form is produced;
//! there is no decoder here, this engine only ever sends FEC.

use bytes::{BufMut, Bytes, BytesMut};

/// A media packet's fields relevant to FEC protection, decoupled from the
/// concrete `rtp::Packet` type so the encoder can be unit-tested without
/// constructing full RTP packets.
#[derive(Debug, Clone)]
pub struct ProtectedPacket {
    pub sequence_number: u16,
    pub timestamp: u32,
    pub marker: bool,
    pub payload_type: u8,
    pub payload: Bytes,
}

/// Stateful draft-03 FlexFEC encoder for one media SSRC / FEC SSRC pair.
pub struct FlexFecEncoder03 {
    fec_payload_type: u8,
    fec_ssrc: u32,
    protected_ssrc: u32,
    next_fec_sequence_number: u16,
}

impl FlexFecEncoder03 {
    pub fn new(fec_payload_type: u8, fec_ssrc: u32, protected_ssrc: u32) -> Self {
        Self {
            fec_payload_type,
            fec_ssrc,
            protected_ssrc,
            next_fec_sequence_number: 0,
        }
    }

    /// Produces `repair_count` FEC packets covering `group`, each an
    /// independent XOR combination of the whole group (a 1-packet-overhead
    /// protection scheme; `repair_count` greater than 1 simply repeats the
    /// same combination on successive FEC sequence numbers, which recovers
    /// at most one lost packet per repair sent but tolerates duplicate
    /// repair loss).
    ///
    /// `group.len()` must be at most 15 (the short mask's bit width);
    /// callers are expected to have already capped the protection group at
    /// that size.
    pub fn encode(&mut self, group: &[ProtectedPacket], repair_count: u32) -> Vec<(u16, u32, Bytes)> {
        if group.is_empty() || repair_count == 0 {
            return Vec::new();
        }
        debug_assert!(group.len() <= 15, "FlexFEC short mask covers at most 15 packets");

        let base_seq = group[0].sequence_number;
        let max_len = group.iter().map(|p| p.payload.len()).max().unwrap_or(0);

        let mut pt_recovery: u8 = 0;
        let mut ts_recovery: u32 = 0;
        let mut marker_recovery = false;
        let mut length_recovery: u16 = 0;
        let mut payload_recovery = vec![0u8; max_len];

        for pkt in group {
            pt_recovery ^= pkt.payload_type;
            ts_recovery ^= pkt.timestamp;
            marker_recovery ^= pkt.marker;
            length_recovery ^= pkt.payload.len() as u16;
            for (i, b) in pkt.payload.iter().enumerate() {
                payload_recovery[i] ^= b;
            }
        }

        let mut mask: u16 = 0;
        for pkt in group {
            let offset = pkt.sequence_number.wrapping_sub(base_seq);
            if offset < 15 {
                mask |= 1 << (14 - offset);
            }
        }

        let mut out = Vec::with_capacity(repair_count as usize);
        for _ in 0..repair_count {
            let seq = self.next_fec_sequence_number;
            self.next_fec_sequence_number = self.next_fec_sequence_number.wrapping_add(1);

            // FlexFEC-03 header, single protected SSRC, short (15-bit) mask:
            // byte0: 0|R|X|CC(4)|M recovery, byte1: PT recovery, bytes2-3:
            // length recovery, bytes4-7: TS recovery, byte8: SSRCCount,
            // byte9 + bytes10-11: reserved, bytes12-15: protected SSRC,
            // bytes16-17: SN base, bytes18-19: mask (top bit K=0).
            let mut header = BytesMut::with_capacity(20 + payload_recovery.len());
            header.put_u8(if marker_recovery { 0x80 } else { 0x00 });
            header.put_u8(pt_recovery & 0x7F);
            header.put_u16(length_recovery);
            header.put_u32(ts_recovery);
            header.put_u8(1); // SSRCCount: single protected SSRC.
            header.put_u8(0);
            header.put_u16(0); // reserved
            header.put_u32(self.protected_ssrc);
            header.put_u16(base_seq);
            header.put_u16(mask); // top bit (K) stays 0: short 15-bit mask form.
            header.extend_from_slice(&payload_recovery);

            out.push((seq, self.fec_ssrc, header.freeze()));
        }
        out
    }

    pub fn payload_type(&self) -> u8 {
        self.fec_payload_type
    }

    pub fn ssrc(&self) -> u32 {
        self.fec_ssrc
    }
}
