//! Rooms served by this process
//!
//! A `LiveRoom` knows its producers, fans announcements out to local
//! subscribers (and NATS when configured), and owns the room's recording
//! client while recording is on.

use crate::nats::{AnnouncementMessage, NatsAnnouncer};
use crate::recorder::RecordingClient;
use crate::relay::{Client, LocalUpConnection, Room, UpConnection};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

pub struct LiveRoom {
    name: String,
    root: PathBuf,
    producers: Vec<Arc<LocalUpConnection>>,
    recorder: Mutex<Option<Arc<RecordingClient>>>,
    announcements: broadcast::Sender<AnnouncementMessage>,
    nats: Option<NatsAnnouncer>,
}

impl LiveRoom {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        producers: Vec<Arc<LocalUpConnection>>,
        nats: Option<NatsAnnouncer>,
    ) -> Self {
        let (announcements, _) = broadcast::channel(100);
        Self {
            name: name.into(),
            root: root.into(),
            producers,
            recorder: Mutex::new(None),
            announcements,
            nats,
        }
    }

    /// Root directory; this room records into `<root>/<name>`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn directory(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn producers(&self) -> &[Arc<LocalUpConnection>] {
        &self.producers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnnouncementMessage> {
        self.announcements.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.lock().is_some()
    }

    pub fn recorder(&self) -> Option<Arc<RecordingClient>> {
        self.recorder.lock().clone()
    }

    /// Start recording every producer of the room.
    ///
    /// A producer that can't be recorded has already been announced; the
    /// others are recorded regardless.
    pub fn start_recording(self: &Arc<Self>) -> Result<Arc<RecordingClient>> {
        let mut recorder = self.recorder.lock();
        if recorder.is_some() {
            bail!("Room {} is already recording", self.name);
        }

        info!("Starting recording in room {}", self.name);

        let room: Arc<dyn Room> = self.clone();
        let client = Arc::new(RecordingClient::new(&room, &self.root));
        for producer in &self.producers {
            let up: Arc<dyn UpConnection> = producer.clone();
            if let Err(e) = client.push_conn(
                &**self,
                producer.id(),
                Some(up),
                producer.tracks(),
                producer.label(),
            ) {
                error!("Failed to record {} in room {}: {}", producer.id(), self.name, e);
            }
        }

        *recorder = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Stop recording. Returns false if the room wasn't recording.
    pub fn stop_recording(&self) -> bool {
        let client = self.recorder.lock().take();
        match client {
            Some(client) => {
                if let Err(e) = client.close() {
                    error!("Failed to stop recording in room {}: {}", self.name, e);
                }
                true
            }
            None => false,
        }
    }
}

impl Room for LiveRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn announce(&self, message: &str) {
        info!("[{}] {}", self.name, message);
        let announcement = AnnouncementMessage::new(&self.name, message);
        if let Some(nats) = &self.nats {
            nats.publish(announcement.clone());
        }
        // no subscribers is fine
        let _ = self.announcements.send(announcement);
    }

    fn remove_client(&self, client_id: &str) {
        let mut recorder = self.recorder.lock();
        if recorder.as_ref().map_or(false, |c| c.id() == client_id) {
            *recorder = None;
        }
    }
}

/// Group producers by room.
pub fn build_rooms(
    root: impl AsRef<Path>,
    producers: Vec<(String, Arc<LocalUpConnection>)>,
    nats: Option<NatsAnnouncer>,
) -> HashMap<String, Arc<LiveRoom>> {
    let mut grouped: HashMap<String, Vec<Arc<LocalUpConnection>>> = HashMap::new();
    for (room, producer) in producers {
        grouped.entry(room).or_default().push(producer);
    }

    grouped
        .into_iter()
        .map(|(name, producers)| {
            let room = Arc::new(LiveRoom::new(
                name.clone(),
                root.as_ref(),
                producers,
                nats.clone(),
            ));
            (name, room)
        })
        .collect()
}
