use super::filename::open_disk_file;
use super::track::{TrackRecorder, TrackState};
use crate::codec::{CodecKind, SampleQueue};
use crate::error::{RecorderError, Result};
use crate::relay::{DownConnection, DownTrack, Room, UpConnection, UpTrack};
use crate::webm::{new_simple_block_writer, TrackEntry};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Minimum spacing between two operator warnings from one connection.
pub const WARNING_INTERVAL: Duration = Duration::from_secs(10);

/// Suppresses repeated warnings inside a fixed window.
#[derive(Debug, Clone)]
pub struct WarningThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl WarningThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Returns true, and opens a new window, if a warning may be emitted at `now`.
    pub fn allow(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Mutable state of a connection, guarded by the connection lock.
///
/// `file` is `Some` exactly when every track holds a writer for the current
/// `width` x `height`.
pub(super) struct ConnectionState {
    pub(super) file: Option<PathBuf>,
    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) tracks: Vec<TrackState>,
    pub(super) throttle: WarningThrottle,
    pub(super) files: Vec<PathBuf>,
    pub(super) closed: bool,
}

/// Records every supported track of one producer connection into a
/// single WebM file, starting a new file whenever the video resolution
/// changes.
pub struct ConnectionRecorder {
    room: Weak<dyn Room>,
    directory: PathBuf,
    label: String,
    has_video: bool,
    remote: Arc<dyn UpConnection>,
    pub(super) state: Mutex<ConnectionState>,
}

impl ConnectionRecorder {
    /// Build a recorder for `remote_tracks` and register it with the producer.
    ///
    /// Tracks in a codec we can't record are announced and skipped. A second
    /// video track fails the whole connection before anything is registered.
    pub fn new(
        room: Weak<dyn Room>,
        directory: impl Into<PathBuf>,
        label: &str,
        up: Arc<dyn UpConnection>,
        remote_tracks: Vec<Arc<dyn UpTrack>>,
    ) -> Result<Arc<Self>> {
        let mut has_video = false;
        let mut accepted = Vec::with_capacity(remote_tracks.len());

        for remote in remote_tracks {
            let codec = remote.codec();
            let kind = CodecKind::from_mime_type(&codec.mime_type);
            let Some(queue) = SampleQueue::new(kind, codec.clock_rate) else {
                let message = RecorderError::UnsupportedCodec(codec.mime_type.clone()).to_string();
                warn!("{}", message);
                if let Some(room) = room.upgrade() {
                    room.announce(&message);
                }
                continue;
            };
            if kind.is_video() {
                if has_video {
                    return Err(RecorderError::MultipleVideoTracks);
                }
                has_video = true;
            }
            accepted.push((remote, kind, codec, queue));
        }

        let connection = Arc::new_cyclic(|weak: &Weak<ConnectionRecorder>| {
            let tracks = accepted
                .into_iter()
                .enumerate()
                .map(|(index, (remote, kind, codec, queue))| {
                    let handle = Arc::new(TrackRecorder::new(weak.clone(), index, remote));
                    TrackState::new(handle, kind, codec, queue)
                })
                .collect();

            ConnectionRecorder {
                room,
                directory: directory.into(),
                label: label.to_string(),
                has_video,
                remote: Arc::clone(&up),
                state: Mutex::new(ConnectionState {
                    file: None,
                    width: 0,
                    height: 0,
                    tracks,
                    throttle: WarningThrottle::new(WARNING_INTERVAL),
                    files: Vec::new(),
                    closed: false,
                }),
            }
        });

        for handle in connection.track_handles() {
            let local: Arc<dyn DownTrack> = handle.clone();
            if let Err(e) = handle.remote().add_local(local) {
                connection.detach_tracks();
                return Err(e);
            }
        }

        let down: Arc<dyn DownConnection> = connection.clone();
        if let Err(e) = up.add_local(down) {
            connection.detach_tracks();
            return Err(e);
        }

        info!(
            "Recording connection {} ({} tracks) into {}",
            up.id(),
            connection.track_count(),
            connection.directory.display()
        );

        Ok(connection)
    }

    pub fn id(&self) -> &str {
        self.remote.id()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    pub fn track_count(&self) -> usize {
        self.state.lock().tracks.len()
    }

    /// Current video resolution; (0, 0) for audio-only recordings.
    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    /// File currently being written, if any.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.state.lock().file.clone()
    }

    /// Every file this connection has created, oldest first.
    pub fn files(&self) -> Vec<PathBuf> {
        self.state.lock().files.clone()
    }

    fn track_handles(&self) -> Vec<Arc<TrackRecorder>> {
        self.state
            .lock()
            .tracks
            .iter()
            .map(|t| Arc::clone(&t.handle))
            .collect()
    }

    fn detach_tracks(&self) {
        for handle in self.track_handles() {
            let local: Arc<dyn DownTrack> = handle.clone();
            handle.remote().del_local(&local);
        }
    }

    /// Forward a diagnostic to the room, at most once per `WARNING_INTERVAL`.
    // called locked
    pub(super) fn warn(&self, state: &mut ConnectionState, message: &str) {
        if !state.throttle.allow(Instant::now()) {
            return;
        }
        warn!("{}", message);
        if let Some(room) = self.room.upgrade() {
            room.announce(message);
        }
    }

    /// Close every track writer and forget the current file.
    // called locked
    fn close_writers(state: &mut ConnectionState) {
        for track in &mut state.tracks {
            if let Some(mut writer) = track.writer.take() {
                if let Err(e) = writer.close() {
                    warn!("Failed to close track writer: {}", e);
                }
            }
        }
        state.file = None;
    }

    /// Make sure every track has a writer for a `width` x `height` file.
    ///
    /// On any failure the connection is left without file and writers; the
    /// next keyframe will try again.
    // called locked
    pub(super) fn ensure_writer(&self, state: &mut ConnectionState, width: u32, height: u32) -> Result<()> {
        if state.file.is_some() && width == state.width && height == state.height {
            return Ok(());
        }

        let entries = state
            .tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let number = (i + 1) as u64;
                match track.kind {
                    CodecKind::Opus => Ok(TrackEntry::opus(number, track.codec.clock_rate, track.codec.channels)),
                    CodecKind::Vp8 => Ok(TrackEntry::vp8(number, width, height)),
                    CodecKind::Unsupported => Err(RecorderError::UnsupportedCodec(track.codec.mime_type.clone())),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Self::close_writers(state);

        let (file, path) = open_disk_file(&self.directory, &self.label).map_err(|e| {
            error!("Failed to create recording in {}: {}", self.directory.display(), e);
            e
        })?;

        let writers = new_simple_block_writer(file, &entries)?;
        if writers.len() != state.tracks.len() {
            return Err(RecorderError::UnexpectedWriterCount {
                expected: state.tracks.len(),
                actual: writers.len(),
            });
        }

        info!("Recording {} at {}x{} to {}", self.id(), width, height, path.display());

        state.width = width;
        state.height = height;
        for (track, writer) in state.tracks.iter_mut().zip(writers) {
            track.writer = Some(writer);
        }
        state.file = Some(path.clone());
        state.files.push(path);
        Ok(())
    }

    /// Stop recording: detach from the producer, close the file, then
    /// detach every track. Safe to call more than once.
    pub fn close(self: &Arc<Self>) {
        let down: Arc<dyn DownConnection> = self.clone();
        self.remote.del_local(&down);

        let handles = {
            let mut state = self.state.lock();
            state.closed = true;
            Self::close_writers(&mut state);
            state
                .tracks
                .iter()
                .map(|t| Arc::clone(&t.handle))
                .collect::<Vec<_>>()
        };

        for handle in handles {
            let local: Arc<dyn DownTrack> = handle.clone();
            handle.remote().del_local(&local);
        }
    }
}

impl DownConnection for ConnectionRecorder {
    /// A disk recorder never asks the producer to slow down.
    fn max_bitrate(&self, _now: u64) -> u64 {
        u64::MAX
    }
}
