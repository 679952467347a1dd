//! Transport-wide congestion control sequence number extension.
//!
//! <https://datatracker.ietf.org/doc/html/draft-holmer-rmcat-transport-wide-cc-extensions-01>

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};

/// A 16-bit transport-wide sequence number, carried as a 2-byte RTP header extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCcExtension {
    pub transport_sequence: u16,
}

impl Marshal for TransportCcExtension {
    fn marshal_size(&self) -> usize {
        2
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        buf.put_u16(self.transport_sequence);
        Ok(2)
    }
}

impl Unmarshal for TransportCcExtension {
    fn unmarshal<B>(raw: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if raw.remaining() < 2 {
            return Err(Error::ErrBufferTooSmall);
        }
        Ok(TransportCcExtension {
            transport_sequence: raw.get_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ext = TransportCcExtension {
            transport_sequence: 0xBEEF,
        };
        let marshalled = ext.marshal().unwrap();
        let parsed = TransportCcExtension::unmarshal(&mut marshalled.freeze()).unwrap();
        assert_eq!(ext, parsed);
    }
}
