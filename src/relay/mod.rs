//! Relay-side interfaces
//!
//! The recorder plugs into a media relay that owns producer connections,
//! their tracks and the rooms they live in. This module describes those
//! collaborators as traits:
//! - `UpConnection` / `UpTrack`: producers and their tracks
//! - `DownConnection` / `DownTrack`: consumers registered with a producer
//! - `Room`: name and operator announcements
//! - `Client`: the capability contract every room participant satisfies

pub mod local;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webrtc::rtp::packet::Packet;

pub use local::{LocalUpConnection, LocalUpTrack};

/// Codec descriptor negotiated for a producer track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecParameters {
    /// MIME type, e.g. "audio/opus" or "video/VP8"
    pub mime_type: String,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Channel count (audio only; 0 for video)
    #[serde(default)]
    pub channels: u16,
}

impl CodecParameters {
    pub fn new(mime_type: impl Into<String>, clock_rate: u32, channels: u16) -> Self {
        Self {
            mime_type: mime_type.into(),
            clock_rate,
            channels,
        }
    }

    pub fn opus() -> Self {
        Self::new("audio/opus", 48000, 2)
    }

    pub fn vp8() -> Self {
        Self::new("video/VP8", 90000, 0)
    }
}

/// A consumer of one producer track.
pub trait DownTrack: Send + Sync {
    /// Deliver one RTP packet. The packet is only borrowed for the
    /// duration of the call.
    fn write_rtp(&self, packet: &Packet) -> Result<()>;

    fn set_time_offset(&self, ntp: u64, rtp: u32);

    fn set_cname(&self, cname: &str);

    fn accumulate(&self, bytes: u32);
}

/// A consumer of a whole producer connection.
pub trait DownConnection: Send + Sync {
    /// Highest bitrate this consumer wants the producer to send, in bits/s.
    fn max_bitrate(&self, now: u64) -> u64;
}

/// A track of a producer connection.
pub trait UpTrack: Send + Sync {
    fn codec(&self) -> CodecParameters;

    fn add_local(&self, local: Arc<dyn DownTrack>) -> Result<()>;

    /// Returns false if `local` was not registered.
    fn del_local(&self, local: &Arc<dyn DownTrack>) -> bool;
}

/// A producer connection.
pub trait UpConnection: Send + Sync {
    fn id(&self) -> &str;

    fn add_local(&self, local: Arc<dyn DownConnection>) -> Result<()>;

    fn del_local(&self, local: &Arc<dyn DownConnection>) -> bool;
}

/// A conference room as seen by its participants.
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Broadcast an operator-visible message to everyone administering the room.
    fn announce(&self, message: &str);

    /// Forget a client that has left or been kicked.
    fn remove_client(&self, client_id: &str);
}

/// Credentials presented when joining a room.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Permissions pushed to a client by the room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPermissions {
    pub op: bool,
    pub present: bool,
    pub record: bool,
}

/// Capability contract the relay expects from any room participant.
pub trait Client: Send + Sync {
    /// Name of the room this client belongs to.
    fn room_name(&self) -> &str;

    fn id(&self) -> &str;

    fn username(&self) -> &str;

    fn challenge(&self, room: &str, credentials: &ClientCredentials) -> bool;

    fn override_permissions(&self, room: &dyn Room) -> bool;

    fn set_permissions(&self, permissions: ClientPermissions);

    fn push_client(&self, id: &str, username: &str, add: bool) -> Result<()>;

    /// Announce a producer connection. `up == None` withdraws connection `id`.
    fn push_conn(
        &self,
        room: &dyn Room,
        id: &str,
        up: Option<Arc<dyn UpConnection>>,
        tracks: Vec<Arc<dyn UpTrack>>,
        label: &str,
    ) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn kick(&self, id: &str, user: &str, message: &str) -> Result<()>;
}
