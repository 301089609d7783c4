//! Plain RTP ingest
//!
//! Each configured producer track listens on its own UDP port. Packets are
//! handed to the track's consumers; when one of them asks for a keyframe,
//! a Picture Loss Indication is sent back to whoever sent the packet.

use crate::config::IngestConfig;
use crate::relay::{LocalUpConnection, LocalUpTrack};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::packet::Packet;
use webrtc::util::{Marshal, Unmarshal};

/// Minimum spacing between two PLIs sent for the same track.
const PLI_INTERVAL: Duration = Duration::from_secs(1);

const RECEIVE_BUFFER: usize = 1500;

/// A configured producer and the in-process connection that represents it.
pub struct Producer {
    pub config: IngestConfig,
    pub connection: Arc<LocalUpConnection>,
}

impl Producer {
    pub fn new(config: IngestConfig) -> Self {
        let tracks = config
            .tracks
            .iter()
            .map(|t| Arc::new(LocalUpTrack::new(t.codec())))
            .collect();
        let connection = Arc::new(LocalUpConnection::new(
            config.connection.clone(),
            config.label.clone(),
            tracks,
        ));
        Self { config, connection }
    }

    /// Bind one socket per track and start receiving.
    pub async fn spawn(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(self.config.tracks.len());
        for (track_config, track) in self.config.tracks.iter().zip(self.connection.local_tracks()) {
            let addr = format!("{}:{}", self.config.bind, track_config.port);
            let socket = UdpSocket::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind RTP socket on {}", addr))?;

            info!(
                "Receiving {} for {}/{} on {}",
                track_config.mime_type, self.config.room, self.config.connection, addr
            );

            handles.push(tokio::spawn(receive_loop(socket, Arc::clone(track))));
        }
        Ok(handles)
    }
}

/// Receive RTP until the socket fails.
pub async fn receive_loop(socket: UdpSocket, track: Arc<LocalUpTrack>) {
    let mut buf = vec![0u8; RECEIVE_BUFFER];
    let mut last_pli: Option<Instant> = None;

    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!("RTP socket closed: {}", e);
                break;
            }
        };

        let mut data = Bytes::copy_from_slice(&buf[..n]);
        let packet = match Packet::unmarshal(&mut data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping malformed RTP packet from {}: {}", peer, e);
                continue;
            }
        };

        if !track.deliver(&packet) {
            continue;
        }

        let now = Instant::now();
        if last_pli.map_or(false, |t| now.duration_since(t) < PLI_INTERVAL) {
            continue;
        }
        last_pli = Some(now);

        if let Err(e) = send_pli(&socket, peer, packet.header.ssrc).await {
            debug!("Failed to send PLI to {}: {}", peer, e);
        }
    }
}

async fn send_pli(socket: &UdpSocket, peer: SocketAddr, media_ssrc: u32) -> Result<()> {
    let pli = PictureLossIndication {
        sender_ssrc: 0,
        media_ssrc,
    };
    let bytes = pli.marshal().context("Failed to encode PLI")?;
    socket.send_to(&bytes, peer).await?;
    debug!("Requested keyframe from {} (ssrc {})", peer, media_ssrc);
    Ok(())
}
