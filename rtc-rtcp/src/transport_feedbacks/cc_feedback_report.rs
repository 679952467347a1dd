//! Congestion control feedback (RFC 8888). PT=205, FMT=11.

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};
use std::any::Any;

use crate::header::{Header, PacketType, FMT_CCFB};
use crate::packet::Packet;

/// Per-packet arrival metric within one report block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMetric {
    pub received: bool,
    /// ECN codepoint, only meaningful when `received`.
    pub ecn: u8,
    /// Arrival time offset from the report timestamp, in 1/1024 second
    /// units, only meaningful when `received`.
    pub arrival_time_offset: u16,
}

impl PacketMetric {
    fn unreceived() -> Self {
        PacketMetric {
            received: false,
            ecn: 0,
            arrival_time_offset: 0,
        }
    }

    fn unmarshal(word: u16) -> Self {
        let received = (word >> 15) & 0x1 != 0;
        if !received {
            return PacketMetric::unreceived();
        }
        let ecn = ((word >> 13) & 0x3) as u8;
        let arrival_time_offset = word & 0x1FFF;
        PacketMetric {
            received,
            ecn,
            arrival_time_offset,
        }
    }

    fn marshal(&self) -> u16 {
        if !self.received {
            return 0;
        }
        (1 << 15) | ((self.ecn as u16 & 0x3) << 13) | (self.arrival_time_offset & 0x1FFF)
    }
}

/// Per-media-SSRC run of packet metrics, starting at `begin_sequence`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportBlock {
    pub media_ssrc: u32,
    pub begin_sequence: u16,
    pub metrics: Vec<PacketMetric>,
}

impl ReportBlock {
    fn marshal_size(&self) -> usize {
        let metrics_bytes = self.metrics.len() * 2;
        let padded = (metrics_bytes + 3) / 4 * 4;
        8 + padded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CcFeedbackReport {
    pub sender_ssrc: u32,
    pub report_blocks: Vec<ReportBlock>,
    /// NTP-like report timestamp, 1/1024 second units since epoch.
    pub report_timestamp: u32,
}

impl CcFeedbackReport {
    pub(crate) fn unmarshal_body(raw: &mut impl Buf, _header: &Header) -> Result<Self> {
        if raw.remaining() < 4 {
            return Err(Error::PacketTooShort);
        }
        let sender_ssrc = raw.get_u32();

        let mut report_blocks = Vec::new();
        while raw.remaining() > 4 {
            if raw.remaining() < 8 {
                return Err(Error::PacketTooShort);
            }
            let media_ssrc = raw.get_u32();
            let begin_sequence = raw.get_u16();
            let num_reports = raw.get_u16() as usize + 1;

            let metrics_bytes = num_reports * 2;
            let padded = (metrics_bytes + 3) / 4 * 4;
            if raw.remaining() < padded {
                return Err(Error::PacketTooShort);
            }

            let mut metrics = Vec::with_capacity(num_reports);
            for _ in 0..num_reports {
                metrics.push(PacketMetric::unmarshal(raw.get_u16()));
            }
            let padding = padded - metrics_bytes;
            raw.advance(padding);

            report_blocks.push(ReportBlock {
                media_ssrc,
                begin_sequence,
                metrics,
            });
        }

        if raw.remaining() < 4 {
            return Err(Error::PacketTooShort);
        }
        let report_timestamp = raw.get_u32();

        Ok(CcFeedbackReport {
            sender_ssrc,
            report_blocks,
            report_timestamp,
        })
    }
}

impl Marshal for CcFeedbackReport {
    fn marshal_size(&self) -> usize {
        let blocks: usize = self.report_blocks.iter().map(ReportBlock::marshal_size).sum();
        crate::header::HEADER_LENGTH + 4 + blocks + 4
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        let header = Header {
            padding: false,
            count: FMT_CCFB,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (body_len / 4 - 1) as u16,
        };
        header.marshal_to(buf)?;

        buf.put_u32(self.sender_ssrc);
        for block in &self.report_blocks {
            if block.metrics.is_empty() || block.metrics.len() > 0x1_0000 {
                return Err(Error::InvalidSizeOrStartIndex);
            }
            buf.put_u32(block.media_ssrc);
            buf.put_u16(block.begin_sequence);
            buf.put_u16((block.metrics.len() - 1) as u16);
            for metric in &block.metrics {
                buf.put_u16(metric.marshal());
            }
            let metrics_bytes = block.metrics.len() * 2;
            let padded = (metrics_bytes + 3) / 4 * 4;
            for _ in 0..(padded - metrics_bytes) {
                buf.put_u8(0);
            }
        }
        buf.put_u32(self.report_timestamp);

        Ok(buf.len() - start)
    }
}

impl Packet for CcFeedbackReport {
    fn header(&self) -> Header {
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        Header {
            padding: false,
            count: FMT_CCFB,
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
            .downcast_ref::<CcFeedbackReport>()
            .is_some_and(|o| o == self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_block() {
        let report = CcFeedbackReport {
            sender_ssrc: 42,
            report_blocks: vec![ReportBlock {
                media_ssrc: 7,
                begin_sequence: 100,
                metrics: vec![
                    PacketMetric {
                        received: true,
                        ecn: 0,
                        arrival_time_offset: 12,
                    },
                    PacketMetric::unreceived(),
                    PacketMetric {
                        received: true,
                        ecn: 1,
                        arrival_time_offset: 9,
                    },
                ],
            }],
            report_timestamp: 0xABCD_1234,
        };

        let marshalled = report.marshal().unwrap();
        let mut body = marshalled.clone().freeze();
        let header = Header::unmarshal(&mut body).unwrap();
        let parsed = CcFeedbackReport::unmarshal_body(&mut body, &header).unwrap();
        assert_eq!(report, parsed);
    }

    #[test]
    fn round_trips_multiple_blocks() {
        let report = CcFeedbackReport {
            sender_ssrc: 1,
            report_blocks: vec![
                ReportBlock {
                    media_ssrc: 10,
                    begin_sequence: 0,
                    metrics: vec![PacketMetric {
                        received: true,
                        ecn: 0,
                        arrival_time_offset: 1,
                    }],
                },
                ReportBlock {
                    media_ssrc: 20,
                    begin_sequence: 5,
                    metrics: vec![PacketMetric::unreceived(); 4],
                },
            ],
            report_timestamp: 1,
        };

        let marshalled = report.marshal().unwrap();
        let mut body = marshalled.clone().freeze();
        let header = Header::unmarshal(&mut body).unwrap();
        let parsed = CcFeedbackReport::unmarshal_body(&mut body, &header).unwrap();
        assert_eq!(report, parsed);
    }
}
