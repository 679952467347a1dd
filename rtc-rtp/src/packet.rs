//! RTP packet: header plus payload.

use crate::header::Header;
use bytes::{Bytes, BytesMut};
use shared::error::Result;
use shared::marshal::{Marshal, Unmarshal};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl Marshal for Packet {
    fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len()
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        self.header.marshal_to(buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(buf.len() - start)
    }
}

impl Unmarshal for Packet {
    fn unmarshal<B>(raw: &mut B) -> Result<Self>
    where
        B: bytes::Buf,
    {
        let header = Header::unmarshal(raw)?;
        let payload = raw.copy_to_bytes(raw.remaining());
        Ok(Packet { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_packet() {
        let packet = Packet {
            header: Header {
                sequence_number: 7,
                ssrc: 42,
                ..Default::default()
            },
            payload: Bytes::from_static(&[1, 2, 3, 4]),
        };

        let marshalled = packet.marshal().unwrap();
        let parsed = Packet::unmarshal(&mut marshalled.freeze()).unwrap();
        assert_eq!(packet, parsed);
    }
}
