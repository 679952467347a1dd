//! H.264 NAL unit inspection shared between the tagger interceptor and its
//! tests.

/// Result of inspecting one RTP payload's leading NAL header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Unknown,
    KeyFrame,
    DeltaFrame,
    Sei,
}

/// Classifies an H.264 RTP payload, returning the frame type and whether this
/// packet carries the start of a new NAL unit (as opposed to a FU-A
/// continuation fragment).
///
/// Returns `(FrameType::Unknown, false)` for payloads too short to inspect or
/// for NAL unit types this classifier doesn't recognize.
pub fn classify_h264_nal(payload: &[u8]) -> (FrameType, bool) {
    let Some(&first) = payload.first() else {
        return (FrameType::Unknown, false);
    };
    let nal_unit_type = first & 0x1F;

    match nal_unit_type {
        1..=23 => {
            if nal_unit_type == 6 {
                (FrameType::Sei, false)
            } else {
                (FrameType::DeltaFrame, true)
            }
        }
        28 => {
            // FU-A: fragmentation unit header in byte 1.
            let Some(&fu_header) = payload.get(1) else {
                return (FrameType::Unknown, false);
            };
            let start = fu_header >> 7 == 1;
            let fragmented_type = fu_header & 0x1F;
            let frame_type = if fragmented_type == 5 {
                FrameType::KeyFrame
            } else {
                FrameType::DeltaFrame
            };
            (frame_type, start)
        }
        24 => {
            // STAP-A: only the first aggregated NAL unit is inspected.
            let Some(&nalu_header) = payload.get(3) else {
                return (FrameType::Unknown, false);
            };
            let start = nalu_header >> 7 == 1;
            let aggregated_type = nalu_header & 0x1F;
            let frame_type = if aggregated_type == 5 {
                FrameType::KeyFrame
            } else {
                FrameType::DeltaFrame
            };
            (frame_type, start)
        }
        _ => (FrameType::Unknown, false),
    }
}
