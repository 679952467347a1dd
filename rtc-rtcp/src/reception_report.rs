//! Per-source reception report block, embedded in sender/receiver reports.

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceptionReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub total_lost: u32,
    pub last_sequence_number: u32,
    pub jitter: u32,
    pub last_sender_report: u32,
    pub delay: u32,
}

impl ReceptionReport {
    pub const MARSHAL_SIZE: usize = 24;
}

impl Marshal for ReceptionReport {
    fn marshal_size(&self) -> usize {
        Self::MARSHAL_SIZE
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        if self.total_lost > 0xFF_FFFF {
            return Err(Error::InvalidTotalLost);
        }
        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);
        buf.put_uint(self.total_lost as u64, 3);
        buf.put_u32(self.last_sequence_number);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sender_report);
        buf.put_u32(self.delay);
        Ok(Self::MARSHAL_SIZE)
    }
}

impl Unmarshal for ReceptionReport {
    fn unmarshal<B>(raw: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if raw.remaining() < Self::MARSHAL_SIZE {
            return Err(Error::PacketTooShort);
        }
        Ok(ReceptionReport {
            ssrc: raw.get_u32(),
            fraction_lost: raw.get_u8(),
            total_lost: raw.get_uint(3) as u32,
            last_sequence_number: raw.get_u32(),
            jitter: raw.get_u32(),
            last_sender_report: raw.get_u32(),
            delay: raw.get_u32(),
        })
    }
}
