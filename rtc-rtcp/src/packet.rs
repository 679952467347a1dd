//! Dynamically dispatched RTCP packet trait, used to carry heterogeneous
//! compound-packet contents (sender reports, NACKs, TWCC/RFC 8888 feedback).

use bytes::{Buf, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::Marshal;
use std::any::Any;
use std::fmt::Debug;

use crate::header::{Header, PacketType, HEADER_LENGTH};

pub trait Packet: Marshal + Debug {
    fn header(&self) -> Header;
    fn as_any(&self) -> &dyn Any;
    fn equal(&self, other: &dyn Packet) -> bool;
}

/// Parse a compound RTCP packet (back-to-back RTCP packets sharing one buffer)
/// into its constituent packets, dispatching on packet type / feedback format.
pub fn unmarshal(raw: &mut impl Buf) -> Result<Vec<Box<dyn Packet>>> {
    let mut packets = Vec::new();

    while raw.has_remaining() {
        if raw.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }
        let mut peek = &raw.chunk()[..4];
        let header = crate::header::Header::unmarshal(&mut peek)?;
        let body_len = (header.length as usize + 1) * 4;
        if raw.remaining() < body_len {
            return Err(Error::PacketTooShort);
        }
        let mut packet_buf = raw.copy_to_bytes(body_len);

        let packet: Box<dyn Packet> = match header.packet_type {
            PacketType::SenderReport => {
                Box::new(crate::sender_report::SenderReport::unmarshal_body(
                    &mut packet_buf,
                    &header,
                )?)
            }
            PacketType::TransportSpecificFeedback => match header.count {
                crate::header::FMT_NACK => Box::new(
                    crate::transport_feedbacks::transport_layer_nack::TransportLayerNack::unmarshal_body(
                        &mut packet_buf,
                        &header,
                    )?,
                ),
                crate::header::FMT_TWCC => Box::new(
                    crate::transport_feedbacks::transport_layer_cc::TransportLayerCc::unmarshal_body(
                        &mut packet_buf,
                        &header,
                    )?,
                ),
                crate::header::FMT_CCFB => Box::new(
                    crate::transport_feedbacks::cc_feedback_report::CcFeedbackReport::unmarshal_body(
                        &mut packet_buf,
                        &header,
                    )?,
                ),
                _ => return Err(Error::WrongFeedbackType),
            },
            _ => return Err(Error::WrongType),
        };

        packets.push(packet);
    }

    if packets.is_empty() {
        return Err(Error::EmptyCompound);
    }

    Ok(packets)
}

/// Marshal a compound packet (a sequence of RTCP packets sharing one buffer).
pub fn marshal(packets: &[Box<dyn Packet>]) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    for packet in packets {
        packet.marshal_to(&mut buf)?;
    }
    Ok(buf)
}
