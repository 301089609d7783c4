use super::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordingResponse {
    pub room: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub id: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// File currently being written
    pub file: Option<String>,
    /// Files created so far by this connection
    pub files: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomStatus {
    pub room: String,
    pub recording: bool,
    pub producers: usize,
    pub connections: Vec<ConnectionStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordingFile {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn room_not_found(room: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("Room {} not found", room))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /rooms/:room/recording
/// Start recording every producer of a room
pub async fn start_recording(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.room(&room_name) else {
        return room_not_found(&room_name);
    };

    if room.is_recording() {
        return error_response(
            StatusCode::CONFLICT,
            format!("Room {} is already recording", room_name),
        );
    }

    match room.start_recording() {
        Ok(client) => {
            info!("Recording started for room: {}", room_name);
            (
                StatusCode::OK,
                Json(RecordingResponse {
                    room: room_name.clone(),
                    status: "recording".to_string(),
                    message: format!(
                        "Recording {} connection(s) in room {}",
                        client.connection_ids().len(),
                        room_name
                    ),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start recording: {}", e);
            error_response(StatusCode::CONFLICT, e.to_string())
        }
    }
}

/// DELETE /rooms/:room/recording
/// Stop recording a room
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.room(&room_name) else {
        return room_not_found(&room_name);
    };

    if !room.stop_recording() {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Room {} is not recording", room_name),
        );
    }

    info!("Recording stopped for room: {}", room_name);
    (
        StatusCode::OK,
        Json(RecordingResponse {
            room: room_name,
            status: "stopped".to_string(),
            message: "Recording stopped".to_string(),
        }),
    )
        .into_response()
}

/// GET /rooms/:room
/// Recording status of a room
pub async fn get_room_status(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.room(&room_name) else {
        return room_not_found(&room_name);
    };

    let client = room.recorder();
    let connections = client
        .as_ref()
        .map(|client| {
            client
                .connection_ids()
                .into_iter()
                .filter_map(|id| client.connection(&id))
                .map(|conn| {
                    let (width, height) = conn.dimensions();
                    ConnectionStatus {
                        id: conn.id().to_string(),
                        label: conn.label().to_string(),
                        width,
                        height,
                        file: conn
                            .current_file()
                            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned())),
                        files: conn.files().len(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(RoomStatus {
            room: room_name,
            recording: client.map_or(false, |c| !c.is_closed()),
            producers: room.producers().len(),
            connections,
        }),
    )
        .into_response()
}

/// GET /rooms/:room/recordings
/// WebM files recorded in a room, oldest name first
pub async fn list_recordings(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.room(&room_name) else {
        return room_not_found(&room_name);
    };

    let directory = room.directory();
    let mut entries = match tokio::fs::read_dir(&directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::OK, Json(Vec::<RecordingFile>::new())).into_response();
        }
        Err(e) => {
            error!("Failed to list {}: {}", directory.display(), e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list recordings: {}", e),
            );
        }
    };

    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.ends_with(".webm") {
                    continue;
                }
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(RecordingFile { name, size });
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read {}: {}", directory.display(), e);
                break;
            }
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    (StatusCode::OK, Json(files)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
