//! Sender Report (RFC 3550 section 6.4.1): synchronization info plus cumulative
//! packet/octet counters for one outgoing stream.

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};
use std::any::Any;

use crate::header::{Header, PacketType};
use crate::packet::Packet;
use crate::reception_report::ReceptionReport;

const SR_SSRC_OFFSET: usize = 0;
const SR_NTP_OFFSET: usize = SR_SSRC_OFFSET + 4;
const SR_RTP_OFFSET: usize = SR_NTP_OFFSET + 8;
const SR_PACKET_COUNT_OFFSET: usize = SR_RTP_OFFSET + 4;
const SR_OCTET_COUNT_OFFSET: usize = SR_PACKET_COUNT_OFFSET + 4;
const SR_REPORT_OFFSET: usize = SR_OCTET_COUNT_OFFSET + 4;
const SR_HEADER_LENGTH: usize = SR_REPORT_OFFSET;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// 64-bit NTP timestamp (seconds since 1900 in the high 32 bits).
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
    pub profile_extensions: Vec<u8>,
}

impl SenderReport {
    pub(crate) fn unmarshal_body(raw: &mut impl Buf, header: &Header) -> Result<Self> {
        if raw.remaining() < SR_HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let ssrc = raw.get_u32();
        let ntp_time = raw.get_u64();
        let rtp_time = raw.get_u32();
        let packet_count = raw.get_u32();
        let octet_count = raw.get_u32();

        let mut reports = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            reports.push(ReceptionReport::unmarshal(raw)?);
        }

        let profile_extensions = raw.copy_to_bytes(raw.remaining()).to_vec();

        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
            profile_extensions,
        })
    }
}

impl Marshal for SenderReport {
    fn marshal_size(&self) -> usize {
        let mut size = SR_HEADER_LENGTH + crate::header::HEADER_LENGTH;
        size += self.reports.len() * ReceptionReport::MARSHAL_SIZE;
        size += self.profile_extensions.len();
        size
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        if self.reports.len() > 31 {
            return Err(Error::TooManyChunks);
        }

        let start = buf.len();
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        let header = Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::SenderReport,
            length: (body_len / 4 - 1) as u16,
        };
        header.marshal_to(buf)?;

        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_time);
        buf.put_u32(self.rtp_time);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);

        for report in &self.reports {
            report.marshal_to(buf)?;
        }

        buf.extend_from_slice(&self.profile_extensions);

        Ok(buf.len() - start)
    }
}

impl Packet for SenderReport {
    fn header(&self) -> Header {
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::SenderReport,
            length: (body_len / 4 - 1) as u16,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equal(&self, other: &dyn Packet) -> bool {
        other
            .as_any()
            .downcast_ref::<SenderReport>()
            .is_some_and(|o| o == self)
    }
}
