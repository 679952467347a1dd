//! Traits for marshalling wire types to and from `bytes::Bytes`.

use crate::error::Result;
use bytes::{Bytes, BytesMut};

/// Types that can be serialized into their wire representation.
pub trait Marshal {
    /// Number of bytes `marshal` will write.
    fn marshal_size(&self) -> usize;

    /// Write the wire representation into a freshly allocated buffer.
    fn marshal(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf)
    }

    /// Append the wire representation to `buf`.
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize>;
}

/// Types that can be parsed from their wire representation.
pub trait Unmarshal: Sized {
    /// Parse `Self` from `buf`, consuming the bytes that were read.
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        B: bytes::Buf;
}

/// Convenience wrapper for unmarshalling from an owned `Bytes`.
pub fn unmarshal<T: Unmarshal>(mut raw: Bytes) -> Result<T> {
    T::unmarshal(&mut raw)
}
