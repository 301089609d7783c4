use super::connection::ConnectionRecorder;
use super::filename::create_room_directory;
use crate::error::{RecorderError, Result};
use crate::relay::{Client, ClientCredentials, ClientPermissions, Room, UpConnection, UpTrack};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{error, info};

/// Username reported for the recorder in room listings.
pub const RECORDING_USERNAME: &str = "RECORDING";

#[derive(Default)]
struct ClientState {
    down: HashMap<String, Arc<ConnectionRecorder>>,
    closed: bool,
}

/// Room participant that writes every producer connection it is offered
/// to disk, one `ConnectionRecorder` per connection.
pub struct RecordingClient {
    id: String,
    room: Weak<dyn Room>,
    room_name: String,
    directory: PathBuf,
    state: Mutex<ClientState>,
}

impl RecordingClient {
    /// Recordings go to `<root>/<room name>/`.
    pub fn new(room: &Arc<dyn Room>, root: impl AsRef<Path>) -> Self {
        let room_name = room.name().to_string();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            room: Arc::downgrade(room),
            directory: root.as_ref().join(&room_name),
            room_name,
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Ids of the connections currently being recorded.
    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.state.lock().down.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connection(&self, id: &str) -> Option<Arc<ConnectionRecorder>> {
        self.state.lock().down.get(id).cloned()
    }

    /// Start (or restart) recording connection `id`. `up == None` stops it.
    pub fn attach(
        &self,
        id: &str,
        up: Option<Arc<dyn UpConnection>>,
        tracks: Vec<Arc<dyn UpTrack>>,
        label: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(RecorderError::ClientClosed);
        }

        if let Some(old) = state.down.remove(id) {
            old.close();
        }

        let Some(up) = up else {
            return Ok(());
        };

        if let Err(e) = create_room_directory(&self.directory) {
            self.announce(&format!("Write to disk: {}", e));
            return Err(e.into());
        }

        let down = match ConnectionRecorder::new(
            self.room.clone(),
            self.directory.clone(),
            label,
            Arc::clone(&up),
            tracks,
        ) {
            Ok(down) => down,
            Err(e) => {
                self.announce(&format!("Write to disk: {}", e));
                return Err(e);
            }
        };

        state.down.insert(up.id().to_string(), down);
        Ok(())
    }

    fn announce(&self, message: &str) {
        error!("{}: {}", self.room_name, message);
        if let Some(room) = self.room.upgrade() {
            room.announce(message);
        }
    }
}

impl Client for RecordingClient {
    fn room_name(&self) -> &str {
        &self.room_name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn username(&self) -> &str {
        RECORDING_USERNAME
    }

    fn challenge(&self, _room: &str, _credentials: &ClientCredentials) -> bool {
        true
    }

    fn override_permissions(&self, _room: &dyn Room) -> bool {
        true
    }

    fn set_permissions(&self, _permissions: ClientPermissions) {}

    fn push_client(&self, _id: &str, _username: &str, _add: bool) -> Result<()> {
        Ok(())
    }

    fn push_conn(
        &self,
        room: &dyn Room,
        id: &str,
        up: Option<Arc<dyn UpConnection>>,
        tracks: Vec<Arc<dyn UpTrack>>,
        label: &str,
    ) -> Result<()> {
        if room.name() != self.room_name {
            return Ok(());
        }
        self.attach(id, up, tracks, label)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.closed {
            info!("Stopping recording in {}", self.room_name);
        }
        for (_, down) in state.down.drain() {
            down.close();
        }
        state.closed = true;
        Ok(())
    }

    fn kick(&self, _id: &str, _user: &str, _message: &str) -> Result<()> {
        let result = self.close();
        if let Some(room) = self.room.upgrade() {
            room.remove_client(&self.id);
        }
        result
    }
}
