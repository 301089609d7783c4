// Shared fixtures for the integration tests: a room that records its
// announcements, RTP packet builders and canned VP8/Opus payloads.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use webm_recorder::relay::{CodecParameters, LocalUpConnection, LocalUpTrack, Room};
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;

#[derive(Default)]
pub struct TestRoom {
    pub name: String,
    pub announcements: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
}

impl TestRoom {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn announcements(&self) -> Vec<String> {
        self.announcements.lock().clone()
    }
}

impl Room for TestRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn announce(&self, message: &str) {
        self.announcements.lock().push(message.to_string());
    }

    fn remove_client(&self, client_id: &str) {
        self.removed.lock().push(client_id.to_string());
    }
}

pub fn as_room(room: &Arc<TestRoom>) -> Arc<dyn Room> {
    room.clone()
}

pub fn rtp(sequence_number: u16, timestamp: u32, ssrc: u32, payload: Vec<u8>) -> Packet {
    Packet {
        header: Header {
            version: 2,
            marker: true,
            payload_type: 96,
            sequence_number,
            timestamp,
            ssrc,
            ..Default::default()
        },
        payload: Bytes::from(payload),
    }
}

/// One-packet VP8 keyframe: payload descriptor (start of partition),
/// frame tag, start code and dimensions.
pub fn vp8_keyframe(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0x10, 0x50, 0x42, 0x00, 0x9d, 0x01, 0x2a];
    data.extend_from_slice(&width.to_le_bytes());
    data.extend_from_slice(&height.to_le_bytes());
    data.extend_from_slice(&[0xAA; 16]);
    data
}

/// One-packet VP8 interframe.
pub fn vp8_delta() -> Vec<u8> {
    let mut data = vec![0x10, 0x51, 0x42, 0x00];
    data.extend_from_slice(&[0x55; 16]);
    data
}

pub fn opus_frame() -> Vec<u8> {
    vec![0xFC, 0xFF, 0xFE, 0x01, 0x02, 0x03]
}

/// A producer with one Opus and one VP8 track, in that order.
pub struct AvProducer {
    pub audio: Arc<LocalUpTrack>,
    pub video: Arc<LocalUpTrack>,
    pub connection: Arc<LocalUpConnection>,
}

impl AvProducer {
    pub fn new(id: &str) -> Self {
        let audio = Arc::new(LocalUpTrack::new(CodecParameters::opus()));
        let video = Arc::new(LocalUpTrack::new(CodecParameters::vp8()));
        let connection = Arc::new(LocalUpConnection::new(
            id,
            id,
            vec![Arc::clone(&audio), Arc::clone(&video)],
        ));
        Self {
            audio,
            video,
            connection,
        }
    }
}

pub fn audio_only_producer(id: &str) -> (Arc<LocalUpTrack>, Arc<LocalUpConnection>) {
    let audio = Arc::new(LocalUpTrack::new(CodecParameters::opus()));
    let connection = Arc::new(LocalUpConnection::new(id, "", vec![Arc::clone(&audio)]));
    (audio, connection)
}

pub fn video_only_producer(id: &str) -> (Arc<LocalUpTrack>, Arc<LocalUpConnection>) {
    let video = Arc::new(LocalUpTrack::new(CodecParameters::vp8()));
    let connection = Arc::new(LocalUpConnection::new(id, "", vec![Arc::clone(&video)]));
    (video, connection)
}

pub fn webm_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map_or(false, |ext| ext == "webm"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}
