//! Absolute send time extension (24-bit fixed-point NTP timestamp).
//!
//! <http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time>

use bytes::{Buf, BufMut, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};
use std::time::SystemTime;

/// Convert a wall-clock time into a 64-bit NTP timestamp (seconds since 1900 in
/// the high 32 bits, fractional seconds in the low 32 bits).
pub fn unix2ntp(t: SystemTime) -> u64 {
    let since_epoch = t
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let mut s = since_epoch.as_secs();
    s += 0x83AA_7E80; // seconds between 1900 and 1970
    let mut f = since_epoch.subsec_nanos() as u64;
    f <<= 32;
    f /= 1_000_000_000;
    (s << 32) | f
}

/// 24-bit absolute send time: the middle 24 bits of a 64-bit NTP timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbsSendTimeExtension {
    pub timestamp: u64,
}

impl AbsSendTimeExtension {
    pub fn new(send_time: SystemTime) -> Self {
        AbsSendTimeExtension {
            timestamp: unix2ntp(send_time) >> 14,
        }
    }
}

impl Marshal for AbsSendTimeExtension {
    fn marshal_size(&self) -> usize {
        3
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<usize> {
        buf.put_u8((self.timestamp >> 16) as u8);
        buf.put_u8((self.timestamp >> 8) as u8);
        buf.put_u8(self.timestamp as u8);
        Ok(3)
    }
}

impl Unmarshal for AbsSendTimeExtension {
    fn unmarshal<B>(raw: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if raw.remaining() < 3 {
            return Err(Error::ErrBufferTooSmall);
        }
        let b0 = raw.get_u8() as u64;
        let b1 = raw.get_u8() as u64;
        let b2 = raw.get_u8() as u64;
        Ok(AbsSendTimeExtension {
            timestamp: (b0 << 16) | (b1 << 8) | b2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ext = AbsSendTimeExtension { timestamp: 0x00ABCDEF & 0xFFFFFF };
        let marshalled = ext.marshal().unwrap();
        let parsed = AbsSendTimeExtension::unmarshal(&mut marshalled.freeze()).unwrap();
        assert_eq!(ext, parsed);
    }

    #[test]
    fn unix2ntp_has_seconds_offset() {
        let ntp = unix2ntp(SystemTime::UNIX_EPOCH);
        assert_eq!(ntp >> 32, 0x83AA_7E80);
    }
}
