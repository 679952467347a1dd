//! A token-bucket pacer that smooths outgoing RTP across a target send rate.
//!
//! RTP packets are queued in a single FIFO shared by every SSRC on the
//! stream; RTCP is never paced and passes straight through. A budget of
//! bytes accumulates at `target_bitrate * oversend_factor` bits per second
//! and is spent, oldest packet first, on every pacing tick.
//!
//! The target bitrate is read from a shared
//! [`TargetBitrateHandle`](crate::cc::TargetBitrateHandle) published by a
//! bandwidth estimator elsewhere in the chain; the pacer never holds a
//! reference back to the estimator.

use crate::cc::TargetBitrateHandle;
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::Error;
use shared::marshal::Marshal;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_OVERSEND_FACTOR: f64 = 1.5;
const DEFAULT_PACING_INTERVAL: Duration = Duration::from_millis(5);

/// Caps unused budget carried across idle periods, so a long pause doesn't
/// let the pacer burst unboundedly once traffic resumes. Large enough to
/// never block a single max-size packet regardless of target bitrate.
const MAX_BURST_BYTES: f64 = 65_536.0;

/// A cloneable handle publishing the pacer's current send budget and queue
/// depth, for diagnostics that shouldn't hold a reference to the pacer
/// itself.
#[derive(Clone)]
pub struct PacerStatsHandle(Arc<Mutex<(f64, usize)>>);

impl PacerStatsHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new((0.0, 0))))
    }

    pub fn get(&self) -> (f64, usize) {
        *self.0.lock().unwrap()
    }

    fn set(&self, budget_bytes: f64, queue_len: usize) {
        *self.0.lock().unwrap() = (budget_bytes, queue_len);
    }
}

impl Default for PacerStatsHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LeakyBucketPacerBuilder<P> {
    handle: TargetBitrateHandle,
    stats_handle: Option<PacerStatsHandle>,
    oversend_factor: f64,
    pacing_interval: Duration,
    _phantom: PhantomData<P>,
}

impl<P> LeakyBucketPacerBuilder<P> {
    pub fn new(handle: TargetBitrateHandle) -> Self {
        Self {
            handle,
            stats_handle: None,
            oversend_factor: DEFAULT_OVERSEND_FACTOR,
            pacing_interval: DEFAULT_PACING_INTERVAL,
            _phantom: PhantomData,
        }
    }

    /// Multiplier applied to the published target bitrate before computing
    /// the send budget. Values above 1.0 intentionally send a little faster
    /// than the estimate to help probe for more available bandwidth.
    pub fn with_oversend_factor(mut self, factor: f64) -> Self {
        self.oversend_factor = factor;
        self
    }

    pub fn with_pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    /// Also publish the current budget and queue depth through `handle`.
    pub fn with_stats_handle(mut self, handle: PacerStatsHandle) -> Self {
        self.stats_handle = Some(handle);
        self
    }

    pub fn build(self) -> impl FnOnce(P) -> LeakyBucketPacerInterceptor<P> {
        move |inner| LeakyBucketPacerInterceptor {
            inner,
            handle: self.handle,
            stats_handle: self.stats_handle,
            oversend_factor: self.oversend_factor,
            pacing_interval: self.pacing_interval,
            eto: Instant::now(),
            last_drain: Instant::now(),
            budget_bytes: 0.0,
            pending: VecDeque::new(),
            write_queue: VecDeque::new(),
        }
    }
}

pub struct LeakyBucketPacerInterceptor<P> {
    inner: P,

    handle: TargetBitrateHandle,
    stats_handle: Option<PacerStatsHandle>,
    oversend_factor: f64,
    pacing_interval: Duration,

    eto: Instant,
    last_drain: Instant,
    budget_bytes: f64,

    pending: VecDeque<TaggedPacket>,
    write_queue: VecDeque<TaggedPacket>,
}

fn packet_bytes(pkt: &TaggedPacket) -> usize {
    match &pkt.message {
        Packet::Rtp(rtp_packet) => rtp_packet.marshal_size(),
        Packet::Rtcp(_) => 0,
    }
}

impl<P> LeakyBucketPacerInterceptor<P> {
    fn drain(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_drain).as_secs_f64();
        self.last_drain = now;

        let target_bps = self.handle.get() as f64 * self.oversend_factor;
        self.budget_bytes += elapsed * target_bps / 8.0;
        self.budget_bytes = self.budget_bytes.min(MAX_BURST_BYTES);

        while let Some(front) = self.pending.front() {
            let size = packet_bytes(front) as f64;
            if size > self.budget_bytes {
                break;
            }
            self.budget_bytes -= size;
            let pkt = self.pending.pop_front().expect("front just peeked");
            self.write_queue.push_back(pkt);
        }

        if let Some(stats_handle) = &self.stats_handle {
            stats_handle.set(self.budget_bytes, self.pending.len());
        }
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()> for LeakyBucketPacerInterceptor<P> {
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
        match msg.message {
            Packet::Rtp(_) => {
                self.pending.push_back(msg);
                Ok(())
            }
            Packet::Rtcp(_) => self.inner.handle_write(msg),
        }
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        if let Some(pkt) = self.write_queue.pop_front() {
            return Some(pkt);
        }
        self.inner.poll_write()
    }

    fn handle_event(&mut self, evt: ()) -> Result<(), Self::Error> {
        self.inner.handle_event(evt)
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.inner.poll_event()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        if self.eto <= now {
            self.eto = now + self.pacing_interval;
            self.drain(now);
        }
        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        if let Some(eto) = self.inner.poll_timeout()
            && eto < self.eto
        {
            Some(eto)
        } else {
            Some(self.eto)
        }
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.pending.clear();
        self.write_queue.clear();
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for LeakyBucketPacerInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }
}
