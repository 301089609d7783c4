// Integration tests for the recording pipeline
//
// Packets are fed through in-process producers exactly as the ingest
// sockets would; the resulting WebM files are checked with the probe.

mod common;

use anyhow::Result;
use common::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;
use webm_recorder::relay::{Client, CodecParameters, LocalUpConnection, LocalUpTrack, Room, UpConnection};
use webm_recorder::webm::{self, TrackType};
use webm_recorder::{ConnectionRecorder, RecorderError, RecordingClient};

const AUDIO_SSRC: u32 = 0x1111;
const VIDEO_SSRC: u32 = 0x2222;

fn up(connection: &Arc<LocalUpConnection>) -> Option<Arc<dyn UpConnection>> {
    Some(connection.clone())
}

#[test]
fn test_resolution_change_starts_new_file() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("standup");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let producer = AvProducer::new("alice-cam");

    client.attach("alice-cam", up(&producer.connection), producer.connection.tracks(), "alice")?;
    assert_eq!(producer.audio.local_count(), 1);
    assert_eq!(producer.video.local_count(), 1);
    assert_eq!(producer.connection.local_count(), 1);

    // Ten frames at 640x480, then a keyframe at 1280x720 and one more
    // frame so the keyframe leaves the reorder buffer.
    for i in 0..10u16 {
        let frame = if i == 0 { vp8_keyframe(640, 480) } else { vp8_delta() };
        producer.video.deliver(&rtp(i, i as u32 * 3000, VIDEO_SSRC, frame));
        producer.audio.deliver(&rtp(i, i as u32 * 960, AUDIO_SSRC, opus_frame()));
    }
    producer.video.deliver(&rtp(10, 30000, VIDEO_SSRC, vp8_keyframe(1280, 720)));
    producer.video.deliver(&rtp(11, 33000, VIDEO_SSRC, vp8_delta()));
    producer.audio.deliver(&rtp(10, 9600, AUDIO_SSRC, opus_frame()));
    producer.audio.deliver(&rtp(11, 10560, AUDIO_SSRC, opus_frame()));

    let connection = client.connection("alice-cam").expect("connection is recorded");
    assert_eq!(connection.dimensions(), (1280, 720));
    let files = connection.files();
    assert_eq!(files.len(), 2);
    assert_ne!(files[0], files[1]);

    client.close()?;
    assert_eq!(producer.audio.local_count(), 0);
    assert_eq!(producer.video.local_count(), 0);
    assert_eq!(producer.connection.local_count(), 0);

    let on_disk = webm_files(&root.path().join("standup"));
    assert_eq!(on_disk.len(), 2);

    let first = webm::probe(&files[0])?;
    let second = webm::probe(&files[1])?;
    assert_eq!(first.doc_type, "webm");

    let resolutions: BTreeSet<_> = [&first, &second]
        .iter()
        .filter_map(|info| info.video().map(|v| (v.pixel_width, v.pixel_height)))
        .collect();
    assert_eq!(resolutions, BTreeSet::from([(640, 480), (1280, 720)]));
    assert_eq!(first.video().map(|v| v.pixel_width), Some(640));

    // Audio entry is identical in both files.
    assert_eq!(first.tracks[0], second.tracks[0]);
    assert_eq!(first.tracks[0].track_type, TrackType::Audio);
    assert_eq!(first.tracks[0].codec_id, "A_OPUS");
    assert_eq!(first.tracks[1].codec_id, "V_VP8");

    assert_eq!(first.block_count(2), 10);
    assert!(first.block_count(1) > 0);
    let first_video = first.blocks.iter().find(|b| b.track_number == 2).expect("video block");
    assert!(first_video.keyframe);
    let second_video = second.blocks.iter().find(|b| b.track_number == 2).expect("video block");
    assert!(second_video.keyframe);

    Ok(())
}

#[test]
fn test_nothing_written_before_keyframe() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("standup");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let producer = AvProducer::new("bob-cam");

    client.attach("bob-cam", up(&producer.connection), producer.connection.tracks(), "bob")?;

    let mut asked = false;
    for i in 0..6u16 {
        asked |= producer.video.deliver(&rtp(i, i as u32 * 3000, VIDEO_SSRC, vp8_delta()));
        producer.audio.deliver(&rtp(i, i as u32 * 960, AUDIO_SSRC, opus_frame()));
    }
    assert!(asked, "interframes without a file must request a keyframe");

    let connection = client.connection("bob-cam").expect("connection is recorded");
    assert!(connection.current_file().is_none());
    assert!(webm_files(&root.path().join("standup")).is_empty());

    client.close()?;
    Ok(())
}

#[test]
fn test_timecodes_are_rebased_across_wraparound() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("wrap");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let (video, connection) = video_only_producer("cam");

    client.attach("cam", up(&connection), connection.tracks(), "")?;

    let start = u32::MAX - 4000;
    for i in 0..5u16 {
        let frame = if i == 0 { vp8_keyframe(320, 240) } else { vp8_delta() };
        let ts = start.wrapping_add(i as u32 * 2700);
        video.deliver(&rtp(65533u16.wrapping_add(i), ts, VIDEO_SSRC, frame));
    }

    let path = client
        .connection("cam")
        .and_then(|c| c.current_file())
        .expect("file is open");
    client.close()?;

    let info = webm::probe(&path)?;
    let timecodes: Vec<i64> = info.blocks.iter().map(|b| b.timecode).take(4).collect();
    assert_eq!(timecodes, vec![0, 30, 60, 90]);
    assert_eq!(info.tracks.len(), 1);
    assert_eq!(info.video().map(|v| (v.pixel_width, v.pixel_height)), Some((320, 240)));

    Ok(())
}

#[test]
fn test_keyframe_requested_after_ten_seconds() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("refresh");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let (video, connection) = video_only_producer("cam");

    client.attach("cam", up(&connection), connection.tracks(), "")?;

    // One frame per second of 90 kHz clock.
    let mut results = Vec::new();
    for i in 0..13u16 {
        let frame = if i == 0 { vp8_keyframe(640, 480) } else { vp8_delta() };
        results.push(video.deliver(&rtp(i, i as u32 * 90_000, VIDEO_SSRC, frame)));
    }
    assert!(results[..=10].iter().all(|asked| !asked), "{:?}", results);
    assert!(results[11..].iter().any(|asked| *asked), "{:?}", results);

    // A fresh keyframe clears the request.
    video.deliver(&rtp(13, 13 * 90_000, VIDEO_SSRC, vp8_keyframe(640, 480)));
    let after = video.deliver(&rtp(14, 13 * 90_000 + 3000, VIDEO_SSRC, vp8_delta()));
    assert!(!after);

    // Same resolution, so still one file.
    assert_eq!(client.connection("cam").map(|c| c.files().len()), Some(1));
    client.close()?;
    Ok(())
}

#[test]
fn test_audio_only_connection() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("podcast");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let (audio, connection) = audio_only_producer("mic");

    client.attach("mic", up(&connection), connection.tracks(), "")?;
    for i in 0..4u16 {
        audio.deliver(&rtp(i, i as u32 * 960, AUDIO_SSRC, opus_frame()));
    }

    let recorder = client.connection("mic").expect("connection is recorded");
    assert!(!recorder.has_video());
    assert_eq!(recorder.dimensions(), (0, 0));
    client.close()?;

    let files = webm_files(&root.path().join("podcast"));
    assert_eq!(files.len(), 1);
    let info = webm::probe(&files[0])?;
    assert_eq!(info.tracks.len(), 1);
    assert_eq!(info.tracks[0].codec_id, "A_OPUS");
    assert!(info.video().is_none());
    assert!(info.block_count(1) >= 3);
    assert_eq!(info.blocks[0].timecode, 0);
    Ok(())
}

#[test]
fn test_multiple_video_tracks_rejected() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("studio");
    let dyn_room = as_room(&room);

    let first = Arc::new(LocalUpTrack::new(CodecParameters::vp8()));
    let second = Arc::new(LocalUpTrack::new(CodecParameters::vp8()));
    let connection = Arc::new(LocalUpConnection::new(
        "two-cams",
        "",
        vec![Arc::clone(&first), Arc::clone(&second)],
    ));

    let result = ConnectionRecorder::new(
        Arc::downgrade(&dyn_room),
        root.path(),
        "",
        connection.clone(),
        connection.tracks(),
    );
    assert!(matches!(result, Err(RecorderError::MultipleVideoTracks)));
    assert_eq!(first.local_count(), 0);
    assert_eq!(second.local_count(), 0);
    assert_eq!(connection.local_count(), 0);

    // Through the client the failure is also announced.
    let client = RecordingClient::new(&dyn_room, root.path());
    let err = client
        .attach("two-cams", up(&connection), connection.tracks(), "")
        .unwrap_err();
    assert!(matches!(err, RecorderError::MultipleVideoTracks));
    assert!(client.connection_ids().is_empty());
    assert!(room
        .announcements()
        .iter()
        .any(|m| m.contains("multiple video tracks not supported")));
    Ok(())
}

#[test]
fn test_unsupported_codec_is_announced_and_skipped() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("mixed");
    let client = RecordingClient::new(&as_room(&room), root.path());

    let audio = Arc::new(LocalUpTrack::new(CodecParameters::opus()));
    let h264 = Arc::new(LocalUpTrack::new(CodecParameters::new("video/H264", 90000, 0)));
    let connection = Arc::new(LocalUpConnection::new(
        "legacy",
        "",
        vec![Arc::clone(&audio), Arc::clone(&h264)],
    ));

    client.attach("legacy", up(&connection), connection.tracks(), "")?;

    let recorder = client.connection("legacy").expect("connection is recorded");
    assert_eq!(recorder.track_count(), 1);
    assert!(!recorder.has_video());
    assert_eq!(audio.local_count(), 1);
    assert_eq!(h264.local_count(), 0);
    assert_eq!(room.announcements(), vec!["cannot record codec video/H264".to_string()]);

    client.close()?;
    Ok(())
}

#[test]
fn test_write_failures_are_throttled() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("broken");
    let dyn_room = as_room(&room);
    let (audio, connection) = audio_only_producer("mic");

    // Directory never created, so every open fails.
    let recorder = ConnectionRecorder::new(
        Arc::downgrade(&dyn_room),
        root.path().join("missing"),
        "",
        connection.clone(),
        connection.tracks(),
    )?;

    for i in 0..8u16 {
        audio.deliver(&rtp(i, i as u32 * 960, AUDIO_SSRC, opus_frame()));
    }

    let announcements = room.announcements();
    assert_eq!(announcements.len(), 1, "{:?}", announcements);
    assert!(announcements[0].starts_with("Write to disk"));
    assert!(recorder.current_file().is_none());

    recorder.close();
    Ok(())
}

#[test]
fn test_close_is_idempotent() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("standup");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let producer = AvProducer::new("carol-cam");

    client.attach("carol-cam", up(&producer.connection), producer.connection.tracks(), "carol")?;
    producer.video.deliver(&rtp(0, 0, VIDEO_SSRC, vp8_keyframe(640, 480)));
    producer.video.deliver(&rtp(1, 3000, VIDEO_SSRC, vp8_delta()));

    let recorder = client.connection("carol-cam").expect("connection is recorded");
    recorder.close();
    recorder.close();
    assert!(recorder.current_file().is_none());

    // Nothing reaches a closed recorder.
    producer.video.deliver(&rtp(2, 6000, VIDEO_SSRC, vp8_keyframe(640, 480)));
    assert_eq!(recorder.files().len(), 1);

    client.close()?;
    client.close()?;
    assert!(client.is_closed());
    assert!(client.connection_ids().is_empty());

    let err = client
        .attach("carol-cam", up(&producer.connection), producer.connection.tracks(), "carol")
        .unwrap_err();
    assert!(matches!(err, RecorderError::ClientClosed));

    let files = webm_files(&root.path().join("standup"));
    assert_eq!(files.len(), 1);
    assert!(webm::probe(&files[0])?.block_count(2) >= 1);
    Ok(())
}

#[test]
fn test_push_conn_replaces_and_removes() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("standup");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let producer = AvProducer::new("dave-cam");

    client.push_conn(&*room, "dave-cam", up(&producer.connection), producer.connection.tracks(), "dave")?;
    let first = client.connection("dave-cam").expect("connection is recorded");

    // Renegotiation: the old recorder is closed and replaced.
    client.push_conn(&*room, "dave-cam", up(&producer.connection), producer.connection.tracks(), "dave")?;
    let second = client.connection("dave-cam").expect("connection is recorded");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(producer.video.local_count(), 1);
    assert_eq!(producer.connection.local_count(), 1);

    // Other rooms are ignored.
    let elsewhere = TestRoom::new("elsewhere");
    client.push_conn(&*elsewhere, "dave-cam", None, Vec::new(), "")?;
    assert_eq!(client.connection_ids(), vec!["dave-cam".to_string()]);

    client.push_conn(&*room, "dave-cam", None, Vec::new(), "")?;
    assert!(client.connection_ids().is_empty());
    assert_eq!(producer.video.local_count(), 0);
    assert_eq!(producer.connection.local_count(), 0);

    client.close()?;
    Ok(())
}

#[test]
fn test_client_identity_and_kick() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("standup");
    let client = RecordingClient::new(&as_room(&room), root.path());

    assert_eq!(client.username(), "RECORDING");
    assert_eq!(client.room_name(), room.name());
    assert!(client.override_permissions(&*room));
    assert_eq!(client.directory(), root.path().join("standup"));

    let producer = AvProducer::new("erin-cam");
    client.attach("erin-cam", up(&producer.connection), producer.connection.tracks(), "erin")?;

    client.kick("", "admin", "bye")?;
    assert!(client.is_closed());
    assert_eq!(producer.video.local_count(), 0);
    assert_eq!(*room.removed.lock(), vec![client.id().to_string()]);
    Ok(())
}

#[test]
fn test_labels_name_files() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("standup");
    let client = RecordingClient::new(&as_room(&room), root.path());
    let (audio, connection) = audio_only_producer("mic");

    client.attach("mic", up(&connection), connection.tracks(), "frank")?;
    for i in 0..3u16 {
        audio.deliver(&rtp(i, i as u32 * 960, AUDIO_SSRC, opus_frame()));
    }
    client.close()?;

    let files = webm_files(&root.path().join("standup"));
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-frank.webm"), "{}", name);
    Ok(())
}

#[test]
fn test_concurrent_delivery_and_close() -> Result<()> {
    let root = TempDir::new()?;
    let room = TestRoom::new("busy");
    let client = Arc::new(RecordingClient::new(&as_room(&room), root.path()));
    let producer = AvProducer::new("gina-cam");

    client.attach("gina-cam", up(&producer.connection), producer.connection.tracks(), "")?;

    let video = Arc::clone(&producer.video);
    let audio = Arc::clone(&producer.audio);
    let sender = std::thread::spawn(move || {
        for i in 0..500u16 {
            let frame = if i % 50 == 0 { vp8_keyframe(640, 480) } else { vp8_delta() };
            video.deliver(&rtp(i, i as u32 * 3000, VIDEO_SSRC, frame));
            audio.deliver(&rtp(i, i as u32 * 960, AUDIO_SSRC, opus_frame()));
        }
    });

    std::thread::sleep(std::time::Duration::from_millis(1));
    client.close()?;
    sender.join().expect("sender thread");

    assert_eq!(producer.video.local_count(), 0);
    for file in webm_files(&root.path().join("busy")) {
        let info = webm::probe(&file)?;
        assert_eq!(info.tracks.len(), 2);
    }
    Ok(())
}
