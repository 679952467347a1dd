//! Frame-type tagging interceptor.
//!
//! Classifies every outbound video packet and publishes the result through a
//! small shared lookup keyed by `(ssrc, sequence_number)`, the same
//! anti-coupling pattern used by [`crate::cc::TargetBitrateHandle`]: the FEC
//! encoder reads from the handle instead of the tagger writing into the
//! packet itself.

use super::classify::{FrameType, classify_h264_nal};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::Error;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const DEFAULT_TAG_CAPACITY: usize = 512;

/// Classification recorded for one outbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTypeData {
    pub frame_type: FrameType,
    pub start: bool,
    pub frame_id: u64,
}

/// Shared, bounded lookup from `(ssrc, seq)` to the tagger's classification
/// of that packet. Cloning is cheap; every clone refers to the same
/// underlying table.
#[derive(Clone)]
pub struct FrameTagHandle {
    inner: Arc<Mutex<FrameTagTable>>,
}

struct FrameTagTable {
    capacity: usize,
    entries: HashMap<(u32, u16), FrameTypeData>,
    order: std::collections::VecDeque<(u32, u16)>,
}

impl FrameTagHandle {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TAG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameTagTable {
                capacity,
                entries: HashMap::new(),
                order: std::collections::VecDeque::new(),
            })),
        }
    }

    fn record(&self, ssrc: u32, seq: u16, data: FrameTypeData) {
        let mut table = self.inner.lock().unwrap();
        let key = (ssrc, seq);
        if table.entries.insert(key, data).is_none() {
            table.order.push_back(key);
            if table.order.len() > table.capacity {
                if let Some(oldest) = table.order.pop_front() {
                    table.entries.remove(&oldest);
                }
            }
        }
    }

    /// Looks up the classification recorded for `(ssrc, seq)`, if any.
    pub fn get(&self, ssrc: u32, seq: u16) -> Option<FrameTypeData> {
        self.inner.lock().unwrap().entries.get(&(ssrc, seq)).copied()
    }
}

impl Default for FrameTagHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FrameTypeTaggerBuilder<P> {
    handle: FrameTagHandle,
    _phantom: PhantomData<P>,
}

impl<P> FrameTypeTaggerBuilder<P> {
    pub fn new(handle: FrameTagHandle) -> Self {
        Self {
            handle,
            _phantom: PhantomData,
        }
    }

    pub fn build(self) -> impl FnOnce(P) -> FrameTypeTaggerInterceptor<P> {
        move |inner| FrameTypeTaggerInterceptor {
            inner,
            handle: self.handle,
            next_frame_ids: HashMap::new(),
            marker_seen: HashMap::new(),
        }
    }
}

pub struct FrameTypeTaggerInterceptor<P> {
    inner: P,
    handle: FrameTagHandle,
    next_frame_ids: HashMap<u32, u64>,
    /// Whether the previous packet on this ssrc carried the RTP marker bit,
    /// which bumps the frame id for the packet that follows it.
    marker_seen: HashMap<u32, bool>,
}

impl<P> FrameTypeTaggerInterceptor<P> {
    fn tag(&mut self, ssrc: u32, seq: u16, marker: bool, payload: &[u8]) {
        let bumped = self.marker_seen.insert(ssrc, marker).unwrap_or(false);
        let frame_id = self.next_frame_ids.entry(ssrc).or_insert(0);
        if bumped {
            *frame_id += 1;
        }
        let (frame_type, start) = classify_h264_nal(payload);
        self.handle.record(
            ssrc,
            seq,
            FrameTypeData {
                frame_type,
                start,
                frame_id: *frame_id,
            },
        );
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()> for FrameTypeTaggerInterceptor<P> {
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtp(rtp_packet) = &msg.message {
            self.tag(
                rtp_packet.header.ssrc,
                rtp_packet.header.sequence_number,
                rtp_packet.header.marker,
                &rtp_packet.payload,
            );
        }
        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.inner.poll_write()
    }

    fn handle_event(&mut self, evt: ()) -> Result<(), Self::Error> {
        self.inner.handle_event(evt)
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.inner.poll_event()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.inner.poll_timeout()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for FrameTypeTaggerInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.next_frame_ids.remove(&info.ssrc);
        self.marker_seen.remove(&info.ssrc);
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use sansio::Protocol;

    fn rtp_pkt(ssrc: u32, seq: u16, marker: bool, payload: Vec<u8>) -> TaggedPacket {
        TaggedPacket {
            now: Instant::now(),
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet {
                header: rtp::header::Header {
                    ssrc,
                    sequence_number: seq,
                    marker,
                    ..Default::default()
                },
                payload: payload.into(),
            }),
        }
    }

    #[test]
    fn classifies_and_publishes_keyframe() {
        let handle = FrameTagHandle::new();
        let mut chain = Registry::new()
            .with(FrameTypeTaggerBuilder::new(handle.clone()).build())
            .build();

        // FU-A start, type 5 (IDR)
        chain
            .handle_write(rtp_pkt(1, 10, false, vec![0x1C, 0b1000_0101]))
            .unwrap();

        let tag = handle.get(1, 10).unwrap();
        assert_eq!(tag.frame_type, FrameType::KeyFrame);
        assert!(tag.start);
        assert_eq!(tag.frame_id, 0);
    }

    #[test]
    fn marker_bit_bumps_frame_id_for_next_packet() {
        let handle = FrameTagHandle::new();
        let mut chain = Registry::new()
            .with(FrameTypeTaggerBuilder::new(handle.clone()).build())
            .build();

        chain.handle_write(rtp_pkt(1, 10, true, vec![0x01])).unwrap();
        chain.handle_write(rtp_pkt(1, 11, false, vec![0x01])).unwrap();

        assert_eq!(handle.get(1, 10).unwrap().frame_id, 0);
        assert_eq!(handle.get(1, 11).unwrap().frame_id, 1);
    }

    #[test]
    fn distinct_ssrcs_track_frame_ids_independently() {
        let handle = FrameTagHandle::new();
        let mut chain = Registry::new()
            .with(FrameTypeTaggerBuilder::new(handle.clone()).build())
            .build();

        chain.handle_write(rtp_pkt(1, 1, true, vec![0x01])).unwrap();
        chain.handle_write(rtp_pkt(2, 1, false, vec![0x01])).unwrap();

        assert_eq!(handle.get(1, 1).unwrap().frame_id, 0);
        assert_eq!(handle.get(2, 1).unwrap().frame_id, 0);
    }

    #[test]
    fn table_evicts_oldest_entry_beyond_capacity() {
        let handle = FrameTagHandle::with_capacity(2);
        let mut chain = Registry::new()
            .with(FrameTypeTaggerBuilder::new(handle.clone()).build())
            .build();

        chain.handle_write(rtp_pkt(1, 1, false, vec![0x01])).unwrap();
        chain.handle_write(rtp_pkt(1, 2, false, vec![0x01])).unwrap();
        chain.handle_write(rtp_pkt(1, 3, false, vec![0x01])).unwrap();

        assert!(handle.get(1, 1).is_none());
        assert!(handle.get(1, 2).is_some());
        assert!(handle.get(1, 3).is_some());
    }
}
