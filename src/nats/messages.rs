use serde::{Deserialize, Serialize};

/// Operator announcement published for a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementMessage {
    pub room: String,
    pub message: String,
    pub timestamp: String,  // RFC3339 timestamp
}

impl AnnouncementMessage {
    pub fn new(room: &str, message: &str) -> Self {
        Self {
            room: room.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Subject the message is published on
    pub fn subject(&self) -> String {
        format!("recorder.{}.announce", self.room)
    }
}
