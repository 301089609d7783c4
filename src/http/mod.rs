//! HTTP API for operators
//!
//! - POST /rooms/:room/recording - Start recording a room
//! - DELETE /rooms/:room/recording - Stop recording a room
//! - GET /rooms/:room - Recording status
//! - GET /rooms/:room/recordings - Files recorded so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ConnectionStatus, RecordingFile, RecordingResponse, RoomStatus};
pub use routes::create_router;
pub use state::AppState;
