//! Error types for the recording core
//!
//! Service-level code (config, HTTP, ingest) uses `anyhow`; the recording
//! core returns `RecorderError` so that the packet path can branch on
//! `KeyframeNeeded` without inspecting strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// Soft signal: the producer should be asked for a fresh keyframe.
    #[error("keyframe needed")]
    KeyframeNeeded,

    #[error("cannot record codec {0}")]
    UnsupportedCodec(String),

    #[error("multiple video tracks not supported")]
    MultipleVideoTracks,

    #[error("recording client is closed")]
    ClientClosed,

    #[error("couldn't create file")]
    CouldNotCreateFile,

    #[error("unexpected number of writers: expected {expected}, got {actual}")]
    UnexpectedWriterCount { expected: usize, actual: usize },

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    pub fn is_keyframe_needed(&self) -> bool {
        matches!(self, RecorderError::KeyframeNeeded)
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
