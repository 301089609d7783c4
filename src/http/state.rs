use crate::room::LiveRoom;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Rooms served by this process (room name → room)
    pub rooms: Arc<HashMap<String, Arc<LiveRoom>>>,
}

impl AppState {
    pub fn new(rooms: HashMap<String, Arc<LiveRoom>>) -> Self {
        Self {
            rooms: Arc::new(rooms),
        }
    }

    pub fn room(&self, name: &str) -> Option<Arc<LiveRoom>> {
        self.rooms.get(name).cloned()
    }
}
