use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webm_recorder::{create_router, room, AppState, Config, NatsAnnouncer, Producer};

#[derive(Parser)]
#[command(name = "webm-recorder")]
#[command(about = "Record RTP producers to WebM files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Receive RTP and serve the recording API
    Serve {
        /// Config file (extension optional)
        #[arg(short, long, default_value = "config/webm-recorder")]
        config: String,
    },
    /// Print the tracks and block counts of a WebM file
    Probe {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config } => serve(&config).await,
        Command::Probe { file } => probe(&file),
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let cfg = Config::load(config_path)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recording directory: {}", cfg.recording.directory);

    let nats = match &cfg.nats {
        Some(nats) => Some(NatsAnnouncer::connect(&nats.url).await?),
        None => None,
    };

    let producers: Vec<Producer> = cfg.ingest.iter().cloned().map(Producer::new).collect();
    let mut sockets = Vec::new();
    for producer in &producers {
        sockets.extend(producer.spawn().await?);
    }

    let rooms = room::build_rooms(
        &cfg.recording.directory,
        producers
            .iter()
            .map(|p| (p.config.room.clone(), Arc::clone(&p.connection)))
            .collect(),
        nats,
    );
    info!("Serving {} room(s)", rooms.len());

    let state = AppState::new(rooms);
    let app = create_router(state.clone());

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down");
    for room in state.rooms.values() {
        room.stop_recording();
    }
    for socket in sockets {
        socket.abort();
    }

    Ok(())
}

fn probe(file: &Path) -> Result<()> {
    let summary = webm_recorder::webm::probe(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    println!("{} (doctype {})", file.display(), summary.doc_type);
    for track in &summary.tracks {
        let detail = match (&track.video, &track.audio) {
            (Some(video), _) => format!("{}x{}", video.pixel_width, video.pixel_height),
            (_, Some(audio)) => format!("{} Hz, {} ch", audio.sampling_frequency, audio.channels),
            _ => String::new(),
        };
        println!(
            "  track {}: {} {} {} - {} blocks",
            track.track_number,
            track.name,
            track.codec_id,
            detail,
            summary.block_count(track.track_number)
        );
    }
    println!("  {} cluster(s)", summary.clusters);

    Ok(())
}
