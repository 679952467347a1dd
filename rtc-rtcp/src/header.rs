//! Common RTCP packet header (RFC 3550 section 6.4.1).

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};

pub const HEADER_LENGTH: usize = 4;
pub const RTP_VERSION: u8 = 2;
const COUNT_MASK: u8 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Goodbye,
    ApplicationDefined,
    TransportSpecificFeedback,
    PayloadSpecificFeedback,
    Unsupported(u8),
}

impl From<u8> for PacketType {
    fn from(v: u8) -> Self {
        match v {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Goodbye,
            204 => PacketType::ApplicationDefined,
            205 => PacketType::TransportSpecificFeedback,
            206 => PacketType::PayloadSpecificFeedback,
            other => PacketType::Unsupported(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(v: PacketType) -> Self {
        match v {
            PacketType::SenderReport => 200,
            PacketType::ReceiverReport => 201,
            PacketType::SourceDescription => 202,
            PacketType::Goodbye => 203,
            PacketType::ApplicationDefined => 204,
            PacketType::TransportSpecificFeedback => 205,
            PacketType::PayloadSpecificFeedback => 206,
            PacketType::Unsupported(other) => other,
        }
    }
}

/// Feedback message type carried in the 5-bit "RC" field of RTPFB/PSFB packets.
pub const FMT_NACK: u8 = 1;
pub const FMT_TWCC: u8 = 15;
pub const FMT_CCFB: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    /// Either the reception-report count, or a feedback message type (FMT).
    pub count: u8,
    pub packet_type: PacketType,
    /// Length of the packet body in 32-bit words, minus one.
    pub length: u16,
}

impl Marshal for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let mut b0 = (RTP_VERSION & 0x3) << 6;
        if self.padding {
            b0 |= 1 << 5;
        }
        b0 |= self.count & COUNT_MASK;
        buf.put_u8(b0);
        buf.put_u8(self.packet_type.into());
        buf.put_u16(self.length);
        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    fn unmarshal<B>(raw: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if raw.remaining() < HEADER_LENGTH {
            return Err(Error::HeaderTooSmall);
        }
        let b0 = raw.get_u8();
        let version = (b0 >> 6) & 0x3;
        if version != RTP_VERSION {
            return Err(Error::BadVersion);
        }
        let padding = (b0 >> 5) & 0x1 != 0;
        let count = b0 & COUNT_MASK;
        let packet_type = PacketType::from(raw.get_u8());
        let length = raw.get_u16();
        Ok(Header {
            padding,
            count,
            packet_type,
            length,
        })
    }
}
