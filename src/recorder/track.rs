use super::connection::{ConnectionRecorder, ConnectionState};
use crate::codec::{CodecKind, SampleQueue};
use crate::error::{RecorderError, Result};
use crate::relay::{CodecParameters, DownTrack, UpTrack};
use crate::webm::BlockWriter;
use std::sync::{Arc, Weak};
use webrtc::rtp::packet::Packet;
use webrtc::util::{Marshal, Unmarshal};

/// Keyframe refresh interval, in seconds of media time.
const KEYFRAME_INTERVAL_SECS: u32 = 10;

/// Set on `origin` once the first sample of a track has been written.
const ORIGIN_VALID: u64 = 1 << 32;

/// Consumer registered with one remote track.
///
/// Holds no media state of its own: everything mutable lives in the
/// connection's `TrackState`, behind the connection lock.
pub struct TrackRecorder {
    connection: Weak<ConnectionRecorder>,
    index: usize,
    remote: Arc<dyn UpTrack>,
}

impl TrackRecorder {
    pub(super) fn new(connection: Weak<ConnectionRecorder>, index: usize, remote: Arc<dyn UpTrack>) -> Self {
        Self {
            connection,
            index,
            remote,
        }
    }

    pub fn remote(&self) -> &Arc<dyn UpTrack> {
        &self.remote
    }
}

impl DownTrack for TrackRecorder {
    fn write_rtp(&self, packet: &Packet) -> Result<()> {
        let Some(connection) = self.connection.upgrade() else {
            return Ok(());
        };
        // initialisation touches every track, so take the connection lock
        let mut state = connection.state.lock();
        if state.closed {
            return Ok(());
        }
        write_sample_locked(&connection, &mut state, self.index, packet)
    }

    fn set_time_offset(&self, _ntp: u64, _rtp: u32) {}

    fn set_cname(&self, _cname: &str) {}

    fn accumulate(&self, _bytes: u32) {}
}

/// Per-track recording state.
pub(super) struct TrackState {
    pub(super) handle: Arc<TrackRecorder>,
    pub(super) kind: CodecKind,
    pub(super) codec: CodecParameters,
    pub(super) queue: SampleQueue,
    pub(super) writer: Option<BlockWriter>,
    /// Bit 32 marks the low 32 bits as a valid anchor timestamp.
    pub(super) origin: u64,
    pub(super) last_keyframe: u32,
}

impl TrackState {
    pub(super) fn new(handle: Arc<TrackRecorder>, kind: CodecKind, codec: CodecParameters, queue: SampleQueue) -> Self {
        Self {
            handle,
            kind,
            codec,
            queue,
            writer: None,
            origin: 0,
            last_keyframe: 0,
        }
    }
}

/// Copy a packet into buffers of our own, so nothing is kept alive that
/// belongs to the caller. Packets that don't survive a round trip are dropped.
fn clone_packet(packet: &Packet) -> Option<Packet> {
    let mut buf = packet.marshal().ok()?;
    Packet::unmarshal(&mut buf).ok()
}

/// Milliseconds between `origin` and `timestamp`, modulo 2^32 ticks.
pub fn rebase_millis(timestamp: u32, origin: u32, clock_rate: u32) -> u32 {
    timestamp.wrapping_sub(origin) / (clock_rate / 1000).max(1)
}

/// Whether a delta frame at `timestamp` is late enough after the last
/// keyframe that a fresh one should be requested.
pub fn keyframe_overdue(timestamp: u32, last_keyframe: u32, clock_rate: u32) -> bool {
    let delta = timestamp.wrapping_sub(last_keyframe);
    delta & 0x8000_0000 == 0 && delta > KEYFRAME_INTERVAL_SECS.saturating_mul(clock_rate)
}

/// Push one packet into track `index` and write out every sample it completes.
pub(super) fn write_sample_locked(
    connection: &ConnectionRecorder,
    state: &mut ConnectionState,
    index: usize,
    packet: &Packet,
) -> Result<()> {
    let Some(packet) = clone_packet(packet) else {
        return Ok(());
    };

    let Some(track) = state.tracks.get_mut(index) else {
        return Ok(());
    };
    track.queue.push(packet);
    let kind = track.kind;
    let clock_rate = track.codec.clock_rate;

    let mut keyframe_needed = false;

    while let Some((data, ts)) = state.tracks[index].queue.pop() {
        let mut keyframe = true;

        match kind {
            CodecKind::Vp8 => {
                if data.is_empty() {
                    continue;
                }
                let frame = kind.classify(&data);
                keyframe = frame.keyframe;
                if keyframe {
                    if let Some((width, height)) = frame.dimensions {
                        if let Err(e) = connection.ensure_writer(state, width, height) {
                            connection.warn(state, &format!("Write to disk: {}", e));
                            return Err(e);
                        }
                    }
                    state.tracks[index].last_keyframe = ts;
                    keyframe_needed = false;
                } else if state.tracks[index].writer.is_some()
                    && keyframe_overdue(ts, state.tracks[index].last_keyframe, clock_rate)
                {
                    keyframe_needed = true;
                }
            }
            _ => {
                if state.tracks[index].writer.is_none() && !connection.has_video() {
                    if let Err(e) = connection.ensure_writer(state, 0, 0) {
                        connection.warn(state, &format!("Write to disk: {}", e));
                        return Err(e);
                    }
                }
            }
        }

        let track = &mut state.tracks[index];
        let Some(writer) = track.writer.as_mut() else {
            // still waiting for the first keyframe
            return if keyframe {
                Ok(())
            } else {
                Err(RecorderError::KeyframeNeeded)
            };
        };

        if track.origin == 0 {
            track.origin = ts as u64 | ORIGIN_VALID;
        }
        let millis = rebase_millis(ts, track.origin as u32, clock_rate);
        writer.write(keyframe, millis as i64, &data)?;
    }

    if keyframe_needed {
        Err(RecorderError::KeyframeNeeded)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_starts_at_zero() {
        assert_eq!(rebase_millis(123_456, 123_456, 90000), 0);
        assert_eq!(rebase_millis(123_456 + 90 * 1500, 123_456, 90000), 1500);
    }

    #[test]
    fn test_rebase_truncates_partial_milliseconds() {
        // 47 ticks at 48 kHz is less than a millisecond
        assert_eq!(rebase_millis(1000 + 47, 1000, 48000), 0);
        assert_eq!(rebase_millis(1000 + 960, 1000, 48000), 20);
    }

    #[test]
    fn test_rebase_across_wraparound() {
        let origin = u32::MAX - 44_999;
        let ts = origin.wrapping_add(90_000);
        assert!(ts < origin);
        assert_eq!(rebase_millis(ts, origin, 90000), 1000);
    }

    #[test]
    fn test_keyframe_overdue_after_ten_seconds() {
        assert!(!keyframe_overdue(10 * 90000, 0, 90000));
        assert!(keyframe_overdue(10 * 90000 + 1, 0, 90000));
        // a timestamp behind the last keyframe is not overdue
        assert!(!keyframe_overdue(5, 1000, 90000));
        assert!(keyframe_overdue(100u32.wrapping_sub(1), u32::MAX - 10 * 90000 - 5, 90000));
    }

    #[test]
    fn test_clone_packet_copies_payload() {
        let mut packet = Packet::default();
        packet.header.version = 2;
        packet.header.sequence_number = 7;
        packet.header.timestamp = 3000;
        packet.payload = bytes::Bytes::from_static(&[1, 2, 3]);

        let copy = clone_packet(&packet).unwrap();
        assert_eq!(copy.header.sequence_number, 7);
        assert_eq!(copy.header.timestamp, 3000);
        assert_eq!(&copy.payload[..], &[1, 2, 3]);
    }
}
