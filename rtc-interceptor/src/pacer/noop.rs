//! A pacer that performs no pacing: every outgoing packet is forwarded
//! immediately.

use crate::stream_info::StreamInfo;
use crate::{Interceptor, TaggedPacket};
use shared::error::Error;
use std::marker::PhantomData;
use std::time::Instant;

pub struct NoopPacerBuilder<P> {
    _phantom: PhantomData<P>,
}

impl<P> Default for NoopPacerBuilder<P> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<P> NoopPacerBuilder<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> impl FnOnce(P) -> NoopPacerInterceptor<P> {
        move |inner| NoopPacerInterceptor { inner }
    }
}

pub struct NoopPacerInterceptor<P> {
    inner: P,
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()> for NoopPacerInterceptor<P> {
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

impl<P: Interceptor> Interceptor for NoopPacerInterceptor<P> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Packet, Registry};
    use sansio::Protocol;

    #[test]
    fn passes_packets_through_unchanged() {
        let mut chain = Registry::new().with(NoopPacerBuilder::new().build()).build();

        let pkt = TaggedPacket {
            now: Instant::now(),
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet::default()),
        };
        chain.handle_write(pkt.clone()).unwrap();
        assert_eq!(chain.poll_write(), Some(pkt));
    }
}
