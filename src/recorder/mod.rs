//! Disk recording
//!
//! Three layers, each owning the next:
//! - `RecordingClient`: one per room, maps producer connections to recorders
//! - `ConnectionRecorder`: one output file shared by all tracks of a producer
//! - `TrackRecorder`: reassembles one track's RTP into samples and writes them
//!
//! Upward links (track to connection, connection to room) are weak.

pub mod client;
pub mod connection;
pub mod filename;
pub mod track;

pub use client::{RecordingClient, RECORDING_USERNAME};
pub use connection::{ConnectionRecorder, WarningThrottle, WARNING_INTERVAL};
pub use filename::{create_unique_file, filename_stem, open_disk_file, MAX_CANDIDATES};
pub use track::{keyframe_overdue, rebase_millis, TrackRecorder};
