//! RTP header (RFC 3550 section 5.1, header extensions per RFC 8285).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};

pub const HEADER_LENGTH: usize = 4;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const EXTENSION_SHIFT: u8 = 4;
pub const EXTENSION_MASK: u8 = 0x1;
pub const CC_MASK: u8 = 0xF;
pub const MARKER_SHIFT: u8 = 7;
pub const MARKER_MASK: u8 = 0x1;
pub const PT_MASK: u8 = 0x7F;
pub const SEQ_NUMBER_OFFSET: usize = 2;
pub const TIMESTAMP_OFFSET: usize = 4;
pub const SSRC_OFFSET: usize = 8;
pub const CSRC_OFFSET: usize = 12;

const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;
const EXTENSION_ID_RESERVED: u8 = 0xF;

/// A single RFC 8285 header extension element: a local id and its payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// RTP packet header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extensions: Vec<Extension>,
    pub extensions_padding: usize,
}

impl Header {
    /// Number of bytes of the fixed header plus CSRC list and extensions.
    pub fn marshal_size(&self) -> usize {
        let mut size = 12 + self.csrc.len() * 4;

        if self.extension {
            size += 4 + self.get_extension_payload_len();
        }

        size
    }

    fn get_extension_payload_len(&self) -> usize {
        let mut len = 0;
        match self.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => {
                for ext in &self.extensions {
                    len += 1 + ext.payload.len();
                }
            }
            EXTENSION_PROFILE_TWO_BYTE => {
                for ext in &self.extensions {
                    len += 2 + ext.payload.len();
                }
            }
            _ => {
                for ext in &self.extensions {
                    len += ext.payload.len();
                }
            }
        }
        len + self.extensions_padding
    }

    /// Set (or replace) a one-byte RFC 8285 extension on this header.
    ///
    /// Chooses the one-byte profile automatically when none is set yet. Two-byte
    /// and non-RFC-5285 (id 0) profiles are left to callers who construct
    /// `extensions` directly.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) -> Result<()> {
        if !(1..=14).contains(&id) {
            return Err(Error::ErrRfc8285OneByteHeaderIdRange);
        }
        if payload.len() > 16 {
            return Err(Error::ErrRfc8285OneByteHeaderSize);
        }

        if !self.extension {
            self.extension = true;
            self.extension_profile = EXTENSION_PROFILE_ONE_BYTE;
        }

        if let Some(existing) = self.extensions.iter_mut().find(|e| e.id == id) {
            existing.payload = payload;
        } else {
            self.extensions.push(Extension { id, payload });
        }
        Ok(())
    }

    /// Look up an extension's payload by local id.
    pub fn get_extension(&self, id: u8) -> Option<Bytes> {
        if !self.extension {
            return None;
        }
        self.extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.payload.clone())
    }

    /// Remove an extension by local id, if present.
    pub fn del_extension(&mut self, id: u8) -> Result<()> {
        let before = self.extensions.len();
        self.extensions.retain(|e| e.id != id);
        if self.extensions.len() == before {
            return Err(Error::ErrHeaderExtensionNotFound);
        }
        Ok(())
    }
}

impl Marshal for Header {
    fn marshal_size(&self) -> usize {
        Header::marshal_size(self)
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();

        let mut b0 = (self.version & VERSION_MASK) << VERSION_SHIFT;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        b0 |= self.csrc.len() as u8 & CC_MASK;
        buf.put_u8(b0);

        let mut b1 = self.payload_type & PT_MASK;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            buf.put_u16(self.extension_profile);
            let payload_len = self.get_extension_payload_len();
            if payload_len % 4 != 0 {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            buf.put_u16((payload_len / 4) as u16);

            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    for ext in &self.extensions {
                        let header = (ext.id << 4) | ((ext.payload.len() - 1) as u8 & 0xF);
                        buf.put_u8(header);
                        buf.put_slice(&ext.payload);
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    for ext in &self.extensions {
                        buf.put_u8(ext.id);
                        buf.put_u8(ext.payload.len() as u8);
                        buf.put_slice(&ext.payload);
                    }
                }
                _ => {
                    for ext in &self.extensions {
                        buf.put_slice(&ext.payload);
                    }
                }
            }

            for _ in 0..self.extensions_padding {
                buf.put_u8(0);
            }
        }

        Ok(buf.len() - start)
    }
}

impl Unmarshal for Header {
    fn unmarshal<B>(raw: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if raw.remaining() < HEADER_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let b0 = raw.get_u8();
        let version = (b0 >> VERSION_SHIFT) & VERSION_MASK;
        let padding = (b0 >> PADDING_SHIFT) & PADDING_MASK != 0;
        let extension = (b0 >> EXTENSION_SHIFT) & EXTENSION_MASK != 0;
        let cc = (b0 & CC_MASK) as usize;

        let b1 = raw.get_u8();
        let marker = (b1 >> MARKER_SHIFT) & MARKER_MASK != 0;
        let payload_type = b1 & PT_MASK;

        if raw.remaining() < 6 + cc * 4 {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let sequence_number = raw.get_u16();
        let timestamp = raw.get_u32();
        let ssrc = raw.get_u32();

        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(raw.get_u32());
        }

        let mut header = Header {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            ..Default::default()
        };

        if extension {
            if raw.remaining() < 4 {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let profile = raw.get_u16();
            header.extension_profile = profile;
            let ext_len = raw.get_u16() as usize * 4;
            if raw.remaining() < ext_len {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }

            let mut consumed = 0;
            match profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    while consumed < ext_len {
                        let b = raw.get_u8();
                        consumed += 1;
                        if b == 0 {
                            continue; // padding
                        }
                        let id = b >> 4;
                        let len = (b & 0xF) as usize + 1;
                        if id == EXTENSION_ID_RESERVED {
                            break;
                        }
                        if consumed + len > ext_len {
                            return Err(Error::ErrHeaderSizeInsufficientForExtension);
                        }
                        let mut payload = vec![0u8; len];
                        raw.copy_to_slice(&mut payload);
                        consumed += len;
                        header.extensions.push(Extension {
                            id,
                            payload: payload.into(),
                        });
                    }
                }
                EXTENSION_PROFILE_TWO_BYTE => {
                    while consumed < ext_len {
                        let id = raw.get_u8();
                        consumed += 1;
                        if id == 0 {
                            continue; // padding
                        }
                        let len = raw.get_u8() as usize;
                        consumed += 1;
                        if consumed + len > ext_len {
                            return Err(Error::ErrHeaderSizeInsufficientForExtension);
                        }
                        let mut payload = vec![0u8; len];
                        raw.copy_to_slice(&mut payload);
                        consumed += len;
                        header.extensions.push(Extension {
                            id,
                            payload: payload.into(),
                        });
                    }
                }
                _ => {
                    let mut payload = vec![0u8; ext_len];
                    raw.copy_to_slice(&mut payload);
                    header.extensions.push(Extension {
                        id: 0,
                        payload: payload.into(),
                    });
                    consumed = ext_len;
                }
            }
            header.extensions_padding = ext_len - consumed;
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_basic_header() {
        let header = Header {
            version: 2,
            marker: true,
            payload_type: 96,
            sequence_number: 12345,
            timestamp: 98765,
            ssrc: 0xdead_beef,
            ..Default::default()
        };

        let marshalled = header.marshal().unwrap();
        let parsed = Header::unmarshal(&mut marshalled.freeze()).unwrap();
        assert_eq!(header, parsed);
    }

    #[test]
    fn round_trips_one_byte_extension() {
        let mut header = Header {
            version: 2,
            sequence_number: 1,
            ..Default::default()
        };
        header.set_extension(5, Bytes::from_static(&[1, 2, 3])).unwrap();

        let marshalled = header.marshal().unwrap();
        let parsed = Header::unmarshal(&mut marshalled.freeze()).unwrap();
        assert_eq!(parsed.get_extension(5).unwrap(), Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn rejects_out_of_range_extension_id() {
        let mut header = Header::default();
        assert!(header.set_extension(0, Bytes::new()).is_err());
        assert!(header.set_extension(15, Bytes::new()).is_err());
    }
}
