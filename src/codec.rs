//! Codec selection and frame classification
//!
//! A track's codec is resolved once, when its recorder is built. The
//! resulting `CodecKind` carries everything the hot path needs: the
//! reorder depth, the depacketizer and keyframe/resolution detection.

use bytes::Bytes;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::rtp::codecs::opus::OpusPacket;
use webrtc::rtp::codecs::vp8::Vp8Packet;
use webrtc::rtp::packet::Packet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Opus,
    Vp8,
    Unsupported,
}

impl CodecKind {
    pub fn from_mime_type(mime_type: &str) -> Self {
        match mime_type.to_ascii_lowercase().as_str() {
            "audio/opus" => CodecKind::Opus,
            "video/vp8" => CodecKind::Vp8,
            _ => CodecKind::Unsupported,
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, CodecKind::Vp8)
    }

    /// Number of packets the reorder buffer holds before giving up on a gap.
    pub fn reorder_depth(self) -> u16 {
        match self {
            CodecKind::Opus => 16,
            CodecKind::Vp8 => 128,
            CodecKind::Unsupported => 0,
        }
    }

    /// Classify a reassembled sample.
    ///
    /// Audio samples are always independently decodable. VP8 keyframes also
    /// carry the coded resolution when the payload is long enough to hold it.
    pub fn classify(self, data: &[u8]) -> FrameInfo {
        match self {
            CodecKind::Vp8 => {
                let keyframe = vp8_is_keyframe(data);
                FrameInfo {
                    keyframe,
                    dimensions: if keyframe { vp8_dimensions(data) } else { None },
                }
            }
            _ => FrameInfo {
                keyframe: true,
                dimensions: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub keyframe: bool,
    /// (width, height), VP8 keyframes only
    pub dimensions: Option<(u32, u32)>,
}

/// The low bit of the VP8 frame tag is clear on keyframes.
pub fn vp8_is_keyframe(data: &[u8]) -> bool {
    data.first().map_or(false, |b| b & 0x1 == 0)
}

/// Width and height from a VP8 keyframe header.
///
/// Bytes 6..10 hold two little-endian 16-bit fields whose low 14 bits are
/// the width and height; the top two bits are the scaling mode.
pub fn vp8_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 10 || !vp8_is_keyframe(data) {
        return None;
    }
    let raw = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
    Some((raw & 0x3FFF, (raw >> 16) & 0x3FFF))
}

/// Per-track jitter buffer reassembling RTP packets into samples.
pub enum SampleQueue {
    Opus(SampleBuilder<OpusPacket>),
    Vp8(SampleBuilder<Vp8Packet>),
}

impl SampleQueue {
    /// Returns `None` for codecs the recorder cannot handle.
    pub fn new(kind: CodecKind, clock_rate: u32) -> Option<Self> {
        let depth = kind.reorder_depth();
        match kind {
            CodecKind::Opus => Some(SampleQueue::Opus(SampleBuilder::new(
                depth,
                OpusPacket::default(),
                clock_rate,
            ))),
            CodecKind::Vp8 => Some(SampleQueue::Vp8(SampleBuilder::new(
                depth,
                Vp8Packet::default(),
                clock_rate,
            ))),
            CodecKind::Unsupported => None,
        }
    }

    pub fn push(&mut self, packet: Packet) {
        match self {
            SampleQueue::Opus(builder) => builder.push(packet),
            SampleQueue::Vp8(builder) => builder.push(packet),
        }
    }

    /// Next complete sample and its RTP timestamp.
    pub fn pop(&mut self) -> Option<(Bytes, u32)> {
        let popped = match self {
            SampleQueue::Opus(builder) => builder.pop_with_timestamp(),
            SampleQueue::Vp8(builder) => builder.pop_with_timestamp(),
        };
        popped.map(|(sample, ts)| (sample.data, ts))
    }
}
