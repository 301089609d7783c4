pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod nats;
pub mod recorder;
pub mod relay;
pub mod room;
pub mod webm;

pub use codec::{CodecKind, FrameInfo};
pub use config::Config;
pub use error::{RecorderError, Result};
pub use http::{create_router, AppState};
pub use ingest::Producer;
pub use nats::{AnnouncementMessage, NatsAnnouncer};
pub use recorder::{ConnectionRecorder, RecordingClient, TrackRecorder};
pub use relay::{
    Client, CodecParameters, DownConnection, DownTrack, LocalUpConnection, LocalUpTrack, Room,
    UpConnection, UpTrack,
};
pub use room::LiveRoom;
