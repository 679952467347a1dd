//! Frame-type classification for outbound video packets.
//!
//! [`classify::classify_h264_nal`] is the pure classification function;
//! [`tagger::FrameTypeTaggerInterceptor`] runs it on every outbound packet
//! and publishes the result through a [`tagger::FrameTagHandle`] that the
//! FEC encoder subscribes to independently.

pub mod classify;
pub mod tagger;

pub use classify::FrameType;
pub use tagger::{FrameTagHandle, FrameTypeData, FrameTypeTaggerBuilder, FrameTypeTaggerInterceptor};
