//! In-process producer implementations
//!
//! Fan packets received by the ingest sockets out to every registered
//! consumer. Used by the server and by the test suite.

use super::{CodecParameters, DownConnection, DownTrack, UpConnection, UpTrack};
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use webrtc::rtp::packet::Packet;

pub struct LocalUpTrack {
    codec: CodecParameters,
    locals: RwLock<Vec<Arc<dyn DownTrack>>>,
}

impl LocalUpTrack {
    pub fn new(codec: CodecParameters) -> Self {
        Self {
            codec,
            locals: RwLock::new(Vec::new()),
        }
    }

    /// Number of registered consumers
    pub fn local_count(&self) -> usize {
        self.locals.read().len()
    }

    /// Deliver a packet to every consumer.
    ///
    /// Returns true if any consumer asked for a keyframe.
    pub fn deliver(&self, packet: &Packet) -> bool {
        let locals = self.locals.read().clone();

        let mut keyframe_needed = false;
        for local in locals {
            match local.write_rtp(packet) {
                Ok(()) => {}
                Err(e) if e.is_keyframe_needed() => keyframe_needed = true,
                Err(e) => debug!("Consumer rejected packet: {}", e),
            }
        }
        keyframe_needed
    }
}

impl UpTrack for LocalUpTrack {
    fn codec(&self) -> CodecParameters {
        self.codec.clone()
    }

    fn add_local(&self, local: Arc<dyn DownTrack>) -> Result<()> {
        let mut locals = self.locals.write();
        if !locals.iter().any(|l| Arc::ptr_eq(l, &local)) {
            locals.push(local);
        }
        Ok(())
    }

    fn del_local(&self, local: &Arc<dyn DownTrack>) -> bool {
        let mut locals = self.locals.write();
        let before = locals.len();
        locals.retain(|l| !Arc::ptr_eq(l, local));
        locals.len() != before
    }
}

pub struct LocalUpConnection {
    id: String,
    label: String,
    tracks: Vec<Arc<LocalUpTrack>>,
    locals: RwLock<Vec<Arc<dyn DownConnection>>>,
}

impl LocalUpConnection {
    pub fn new(id: impl Into<String>, label: impl Into<String>, tracks: Vec<Arc<LocalUpTrack>>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            tracks,
            locals: RwLock::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn local_tracks(&self) -> &[Arc<LocalUpTrack>] {
        &self.tracks
    }

    /// Tracks as relay trait objects, in negotiation order.
    pub fn tracks(&self) -> Vec<Arc<dyn UpTrack>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn UpTrack>)
            .collect()
    }

    pub fn local_count(&self) -> usize {
        self.locals.read().len()
    }

    /// Lowest bitrate requested by any consumer.
    pub fn max_bitrate(&self, now: u64) -> u64 {
        self.locals
            .read()
            .iter()
            .map(|l| l.max_bitrate(now))
            .min()
            .unwrap_or(u64::MAX)
    }
}

impl UpConnection for LocalUpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn add_local(&self, local: Arc<dyn DownConnection>) -> Result<()> {
        let mut locals = self.locals.write();
        if !locals.iter().any(|l| Arc::ptr_eq(l, &local)) {
            locals.push(local);
        }
        Ok(())
    }

    fn del_local(&self, local: &Arc<dyn DownConnection>) -> bool {
        let mut locals = self.locals.write();
        let before = locals.len();
        locals.retain(|l| !Arc::ptr_eq(l, local));
        locals.len() != before
    }
}
